use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use drill_core::model::{Difficulty, TopicId};
use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    /// Current target, including any compensation.
    pub total: u32,
    pub answered: u32,
    pub remaining: u32,
    pub correct: u32,
    /// Consecutive correct problems counted toward the next level.
    pub streak: u32,
    pub difficulty: Difficulty,
    pub is_complete: bool,
}

impl SessionProgress {
    /// Share of resolved problems answered correctly, in `[0, 1]`.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.answered == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.answered)
        }
    }
}

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Emitted once per problem that reaches a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub topic: TopicId,
    pub correct: bool,
    pub time_spent_seconds: f64,
    pub difficulty: Difficulty,
    pub attempts: u32,
    pub revealed: bool,
    pub timed_out: bool,
}

/// Fire-and-forget receiver for progress events.
///
/// Implementations must not block; the controller ignores whatever happens
/// downstream.
pub trait ProgressSink: Send + Sync {
    fn record(&self, event: &ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn record(&self, _event: &ProgressEvent) {}
}

/// Running totals for one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopicTally {
    pub problems: u32,
    pub correct: u32,
    pub revealed: u32,
    pub timed_out: u32,
    pub attempts: u32,
    pub time_spent_seconds: f64,
}

impl TopicTally {
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.problems == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.problems)
        }
    }
}

/// Thread-safe per-topic aggregate of progress events.
#[derive(Debug, Default)]
pub struct ProgressTally {
    topics: Mutex<HashMap<TopicId, TopicTally>>,
}

impl ProgressTally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tally(&self, topic: &TopicId) -> Option<TopicTally> {
        let guard = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(topic).copied()
    }

    #[must_use]
    pub fn topics(&self) -> Vec<TopicId> {
        let guard = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<_> = guard.keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl ProgressSink for ProgressTally {
    fn record(&self, event: &ProgressEvent) {
        let mut guard = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let tally = guard.entry(event.topic.clone()).or_default();
        tally.problems = tally.problems.saturating_add(1);
        if event.correct {
            tally.correct = tally.correct.saturating_add(1);
        }
        if event.revealed {
            tally.revealed = tally.revealed.saturating_add(1);
        }
        if event.timed_out {
            tally.timed_out = tally.timed_out.saturating_add(1);
        }
        tally.attempts = tally.attempts.saturating_add(event.attempts);
        tally.time_spent_seconds += event.time_spent_seconds;
    }
}
