use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── SLOT KINDS ────────────────────────────────────────────────────────────────
//

/// Raw type a single answer slot must coerce to before grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// Whole number, optionally signed.
    Integer,
    /// Any finite decimal number (`3`, `-0.5`, `2,25`).
    Decimal,
    /// Free text; only emptiness is checked.
    Text,
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Why a single slot cannot be graded yet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SlotIssue {
    #[error("answer is empty")]
    Empty,
    #[error("answer is not a number")]
    NotANumber,
    #[error("answer must be a whole number")]
    NotAnInteger,
    #[error("answer slot is missing")]
    Missing,
    #[error("answer slot is not expected")]
    Unexpected,
}

/// Per-slot validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotError {
    pub slot: usize,
    pub issue: SlotIssue,
}

/// Local input validation failure; never consumes an attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} answer slot(s) need attention", .issues.len())]
pub struct InputError {
    issues: Vec<SlotError>,
}

impl InputError {
    #[must_use]
    pub fn issues(&self) -> &[SlotError] {
        &self.issues
    }

    /// Issue reported for a slot, if any.
    #[must_use]
    pub fn issue_for(&self, slot: usize) -> Option<SlotIssue> {
        self.issues
            .iter()
            .find(|err| err.slot == slot)
            .map(|err| err.issue)
    }
}

//
// ─── ANSWER SET ────────────────────────────────────────────────────────────────
//

/// Ordered raw answer values for the active step of a problem.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerSet {
    values: Vec<String>,
}

impl AnswerSet {
    #[must_use]
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// An answer set with `len` empty slots, used as a fresh input draft.
    #[must_use]
    pub fn blank(len: usize) -> Self {
        Self {
            values: vec![String::new(); len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&str> {
        self.values.get(slot).map(String::as_str)
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Overwrite a slot, growing the set with empty slots when needed.
    pub fn set(&mut self, slot: usize, value: impl Into<String>) {
        if slot >= self.values.len() {
            self.values.resize(slot + 1, String::new());
        }
        self.values[slot] = value.into();
    }

    /// Slot value coerced to an integer.
    #[must_use]
    pub fn integer(&self, slot: usize) -> Option<i64> {
        self.get(slot).and_then(parse_integer)
    }

    /// Slot value coerced to a decimal.
    #[must_use]
    pub fn decimal(&self, slot: usize) -> Option<f64> {
        self.get(slot).and_then(parse_decimal)
    }

    /// Check every slot against the declared kinds.
    ///
    /// # Errors
    ///
    /// Returns `InputError` listing each slot that is empty, cannot be coerced,
    /// or does not line up with `kinds`.
    pub fn validate(&self, kinds: &[SlotKind]) -> Result<(), InputError> {
        let mut issues = Vec::new();

        for (slot, kind) in kinds.iter().enumerate() {
            let Some(raw) = self.get(slot) else {
                issues.push(SlotError {
                    slot,
                    issue: SlotIssue::Missing,
                });
                continue;
            };
            if let Some(issue) = check_slot(raw, *kind) {
                issues.push(SlotError { slot, issue });
            }
        }

        for slot in kinds.len()..self.values.len() {
            issues.push(SlotError {
                slot,
                issue: SlotIssue::Unexpected,
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(InputError { issues })
        }
    }
}

impl fmt::Debug for AnswerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.values).finish()
    }
}

impl fmt::Display for AnswerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(value)?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

fn check_slot(raw: &str, kind: SlotKind) -> Option<SlotIssue> {
    if raw.trim().is_empty() {
        return Some(SlotIssue::Empty);
    }
    match kind {
        SlotKind::Text => None,
        SlotKind::Decimal => parse_decimal(raw).is_none().then_some(SlotIssue::NotANumber),
        SlotKind::Integer => {
            if parse_integer(raw).is_some() {
                None
            } else if parse_decimal(raw).is_some() {
                Some(SlotIssue::NotAnInteger)
            } else {
                Some(SlotIssue::NotANumber)
            }
        }
    }
}

//
// ─── COERCION ──────────────────────────────────────────────────────────────────
//

/// Parse a raw answer as an integer, tolerating surrounding whitespace and a
/// leading `+`. `"4.0"` is accepted; `"4.5"` is not.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if let Ok(value) = unsigned.parse::<i64>() {
        return Some(value);
    }
    let decimal = parse_decimal(trimmed)?;
    if decimal.fract() == 0.0 && decimal.abs() < i64::MAX as f64 {
        Some(decimal as i64)
    } else {
        None
    }
}

/// Parse a raw answer as a finite decimal. A single comma is read as the
/// decimal separator.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let normalized = if unsigned.matches(',').count() == 1 && !unsigned.contains('.') {
        unsigned.replace(',', ".")
    } else {
        unsigned.to_owned()
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}
