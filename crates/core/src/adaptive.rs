use crate::model::Difficulty;

/// Consecutive fully-correct problems required before difficulty rises.
pub const STREAK_THRESHOLD: u32 = 10;

//
// ─── ESCALATION ────────────────────────────────────────────────────────────────
//

/// What happened to the level after a correct outcome was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Streak grew; level unchanged.
    Held,
    /// Threshold reached and the level went up by one; streak reset.
    Raised { from: Difficulty, to: Difficulty },
    /// Threshold reached at the cap; streak keeps counting.
    Capped,
}

//
// ─── ADAPTER ───────────────────────────────────────────────────────────────────
//

/// Streak-driven difficulty escalation.
///
/// The controller skips the mutating calls entirely when adaptive difficulty
/// is disabled, leaving the level at its starting value.
///
/// # Examples
///
/// ```
/// # use drill_core::adaptive::{DifficultyAdapter, Escalation};
/// # use drill_core::model::Difficulty;
/// let mut adapter = DifficultyAdapter::with_threshold(Difficulty::MIN, 2);
/// assert_eq!(adapter.on_correct(), Escalation::Held);
/// assert!(matches!(adapter.on_correct(), Escalation::Raised { .. }));
/// assert_eq!(adapter.level().level(), 2);
/// assert_eq!(adapter.streak(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultyAdapter {
    streak: u32,
    level: Difficulty,
    threshold: u32,
}

impl DifficultyAdapter {
    #[must_use]
    pub fn new(start: Difficulty) -> Self {
        Self::with_threshold(start, STREAK_THRESHOLD)
    }

    /// Custom threshold; values below 1 are treated as 1.
    #[must_use]
    pub fn with_threshold(start: Difficulty, threshold: u32) -> Self {
        Self {
            streak: 0,
            level: start,
            threshold: threshold.max(1),
        }
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn level(&self) -> Difficulty {
        self.level
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn on_correct(&mut self) -> Escalation {
        self.streak = self.streak.saturating_add(1);

        if self.streak < self.threshold {
            return Escalation::Held;
        }
        match self.level.raised() {
            Some(next) => {
                let from = self.level;
                self.level = next;
                self.streak = 0;
                Escalation::Raised { from, to: next }
            }
            None => Escalation::Capped,
        }
    }

    pub fn on_incorrect_or_revealed(&mut self) {
        self.streak = 0;
    }
}
