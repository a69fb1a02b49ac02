use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Difficulty, ProblemRecord, SessionId, StepOutcome, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many records for a single session: {len}")]
    TooManyRecords { len: usize },

    #[error("total problems ({total}) does not match outcome counts ({sum})")]
    CountMismatch { total: u32, sum: u32 },

    #[error("timed out problems ({timed_out}) exceed incorrect problems ({incorrect})")]
    TimedOutMismatch { timed_out: u32, incorrect: u32 },
}

/// Outcome tallies for a summary, grouped to keep constructors readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub revealed: u32,
    pub timed_out: u32,
}

/// Difficulty movement over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultySpan {
    pub start: Difficulty,
    pub end: Difficulty,
    pub best_streak: u32,
}

/// Aggregate results of a completed practice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    session_id: SessionId,
    topic: TopicId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    counts: OutcomeCounts,
    time_spent_ms: u64,
    difficulty: DifficultySpan,
}

impl SessionSummary {
    /// Rehydrate a session summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` for reversed timestamps and
    /// `SessionSummaryError::CountMismatch`/`TimedOutMismatch` if totals do not align.
    pub fn from_persisted(
        session_id: SessionId,
        topic: TopicId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        counts: OutcomeCounts,
        time_spent_ms: u64,
        difficulty: DifficultySpan,
    ) -> Result<Self, SessionSummaryError> {
        if completed_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        let sum = counts.correct + counts.incorrect + counts.revealed;
        if sum != counts.total {
            return Err(SessionSummaryError::CountMismatch {
                total: counts.total,
                sum,
            });
        }
        if counts.timed_out > counts.incorrect {
            return Err(SessionSummaryError::TimedOutMismatch {
                timed_out: counts.timed_out,
                incorrect: counts.incorrect,
            });
        }

        Ok(Self {
            session_id,
            topic,
            started_at,
            completed_at,
            counts,
            time_spent_ms,
            difficulty,
        })
    }

    /// Build a summary from the ledger of a finished session.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `completed_at` is before `started_at`.
    /// Returns `SessionSummaryError::TooManyRecords` if the record count cannot fit in `u32`.
    pub fn from_records<P>(
        session_id: SessionId,
        topic: TopicId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        records: &[ProblemRecord<P>],
        difficulty: DifficultySpan,
    ) -> Result<Self, SessionSummaryError> {
        let mut counts = OutcomeCounts {
            total: u32::try_from(records.len()).map_err(|_| {
                SessionSummaryError::TooManyRecords { len: records.len() }
            })?,
            ..OutcomeCounts::default()
        };
        let mut time_spent_ms = 0_u64;

        for record in records {
            match record.outcome() {
                StepOutcome::Correct => counts.correct = counts.correct.saturating_add(1),
                StepOutcome::Revealed => counts.revealed = counts.revealed.saturating_add(1),
                StepOutcome::IncorrectExhausted | StepOutcome::IncorrectRetryable => {
                    counts.incorrect = counts.incorrect.saturating_add(1);
                }
            }
            if record.timed_out() {
                counts.timed_out = counts.timed_out.saturating_add(1);
            }
            let ms = u64::try_from(record.time_spent().num_milliseconds()).unwrap_or(0);
            time_spent_ms = time_spent_ms.saturating_add(ms);
        }

        Self::from_persisted(
            session_id,
            topic,
            started_at,
            completed_at,
            counts,
            time_spent_ms,
            difficulty,
        )
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    #[must_use]
    pub fn total_problems(&self) -> u32 {
        self.counts.total
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.counts.correct
    }

    #[must_use]
    pub fn incorrect(&self) -> u32 {
        self.counts.incorrect
    }

    #[must_use]
    pub fn revealed(&self) -> u32 {
        self.counts.revealed
    }

    #[must_use]
    pub fn timed_out(&self) -> u32 {
        self.counts.timed_out
    }

    #[must_use]
    pub fn time_spent_ms(&self) -> u64 {
        self.time_spent_ms
    }

    #[must_use]
    pub fn difficulty(&self) -> DifficultySpan {
        self.difficulty
    }

    /// Share of problems answered correctly, in `[0, 1]`.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.counts.total == 0 {
            0.0
        } else {
            f64::from(self.counts.correct) / f64::from(self.counts.total)
        }
    }
}
