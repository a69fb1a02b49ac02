use chrono::{DateTime, Utc};
use drill_core::model::{DifficultySpan, OutcomeCounts, SessionSummary, TopicId};
use sqlx::{Row, sqlite::SqliteRow};

use super::{
    SqliteRepository,
    mapping::{
        difficulty_from_i64, i64_from_u64, ser, session_id_from_str, topic_from_str,
        u32_from_i64, u64_from_i64,
    },
};
use crate::repository::{SessionSummaryRepository, SessionSummaryRow, StorageError};

const SUMMARY_COLUMNS: &str = r"
    id, session_id, topic, started_at, completed_at,
    total_problems, correct, incorrect, revealed, timed_out,
    time_spent_ms, start_difficulty, end_difficulty, best_streak
";

fn map_summary_row(row: &SqliteRow) -> Result<SessionSummaryRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let topic: String = row.try_get("topic").map_err(ser)?;
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let completed_at: DateTime<Utc> = row.try_get("completed_at").map_err(ser)?;

    let counts = OutcomeCounts {
        total: u32_from_i64("total_problems", row.try_get("total_problems").map_err(ser)?)?,
        correct: u32_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
        incorrect: u32_from_i64("incorrect", row.try_get("incorrect").map_err(ser)?)?,
        revealed: u32_from_i64("revealed", row.try_get("revealed").map_err(ser)?)?,
        timed_out: u32_from_i64("timed_out", row.try_get("timed_out").map_err(ser)?)?,
    };
    let difficulty = DifficultySpan {
        start: difficulty_from_i64(
            "start_difficulty",
            row.try_get("start_difficulty").map_err(ser)?,
        )?,
        end: difficulty_from_i64("end_difficulty", row.try_get("end_difficulty").map_err(ser)?)?,
        best_streak: u32_from_i64("best_streak", row.try_get("best_streak").map_err(ser)?)?,
    };
    let time_spent_ms = u64_from_i64("time_spent_ms", row.try_get("time_spent_ms").map_err(ser)?)?;

    let summary = SessionSummary::from_persisted(
        session_id_from_str(&session_id)?,
        topic_from_str(topic)?,
        started_at,
        completed_at,
        counts,
        time_spent_ms,
        difficulty,
    )
    .map_err(ser)?;

    Ok(SessionSummaryRow::new(id, summary))
}

#[async_trait::async_trait]
impl SessionSummaryRepository for SqliteRepository {
    async fn append_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError> {
        let counts = summary.counts();
        let span = summary.difficulty();
        let res = sqlx::query(
            r"
                INSERT INTO session_summaries (
                    session_id, topic, started_at, completed_at,
                    total_problems, correct, incorrect, revealed, timed_out,
                    time_spent_ms, start_difficulty, end_difficulty, best_streak
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(summary.topic().as_str())
        .bind(summary.started_at())
        .bind(summary.completed_at())
        .bind(i64::from(counts.total))
        .bind(i64::from(counts.correct))
        .bind(i64::from(counts.incorrect))
        .bind(i64::from(counts.revealed))
        .bind(i64::from(counts.timed_out))
        .bind(i64_from_u64("time_spent_ms", summary.time_spent_ms())?)
        .bind(i64::from(span.start.level()))
        .bind(i64::from(span.end.level()))
        .bind(i64::from(span.best_streak))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => StorageError::Connection(other.to_string()),
        })?;

        let id = res.last_insert_rowid();
        tracing::debug!(id, session_id = %summary.session_id(), "appended session summary");
        Ok(id)
    }

    async fn get_summary(&self, id: i64) -> Result<SessionSummary, StorageError> {
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        Ok(map_summary_row(&row)?.summary)
    }

    async fn list_summary_rows(
        &self,
        topic: &TopicId,
        limit: u32,
    ) -> Result<Vec<SessionSummaryRow>, StorageError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM session_summaries \
             WHERE topic = ?1 ORDER BY completed_at DESC, id DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(topic.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_summary_row).collect()
    }
}
