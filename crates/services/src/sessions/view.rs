use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use drill_core::model::{Difficulty, SessionSummary, TopicId};
use storage::repository::SessionSummaryRepository;

use crate::error::SessionError;

/// Storage identifier for a persisted session summary.
///
/// NOTE: This is currently `i64` to match `SQLite` row IDs.
pub type SessionSummaryId = i64;

/// Presentation-agnostic list item for a session summary.
///
/// No pre-formatted strings; hosts format timestamps and ratios themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryListItem {
    pub id: SessionSummaryId,
    pub completed_at: DateTime<Utc>,

    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub revealed: u32,
    pub timed_out: u32,
    pub time_spent_ms: u64,
    pub start_difficulty: Difficulty,
    pub end_difficulty: Difficulty,
    pub best_streak: u32,
}

impl SessionSummaryListItem {
    #[must_use]
    pub fn from_summary(id: SessionSummaryId, summary: &SessionSummary) -> Self {
        let span = summary.difficulty();
        Self {
            id,
            completed_at: summary.completed_at(),
            total: summary.total_problems(),
            correct: summary.correct(),
            incorrect: summary.incorrect(),
            revealed: summary.revealed(),
            timed_out: summary.timed_out(),
            time_spent_ms: summary.time_spent_ms(),
            start_difficulty: span.start,
            end_difficulty: span.end,
            best_streak: span.best_streak,
        }
    }
}

/// Read-side facade over persisted session summaries.
#[derive(Clone)]
pub struct SessionSummaryService {
    summaries: Arc<dyn SessionSummaryRepository>,
}

impl SessionSummaryService {
    #[must_use]
    pub fn new(summaries: Arc<dyn SessionSummaryRepository>) -> Self {
        Self { summaries }
    }

    /// Most recent summaries for a topic, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn list_recent_summaries(
        &self,
        topic: &TopicId,
        limit: u32,
    ) -> Result<Vec<SessionSummaryListItem>, SessionError> {
        let rows = self.summaries.list_summary_rows(topic, limit).await?;
        Ok(rows
            .iter()
            .map(|row| SessionSummaryListItem::from_summary(row.id, &row.summary))
            .collect())
    }

    /// Fetch a session summary by ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when repository access fails.
    pub async fn get_summary(&self, id: SessionSummaryId) -> Result<SessionSummary, SessionError> {
        Ok(self.summaries.get_summary(id).await?)
    }
}
