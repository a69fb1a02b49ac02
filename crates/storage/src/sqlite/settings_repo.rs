use chrono::Utc;
use drill_core::model::{SessionSettings, SessionSettingsDraft, TopicId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{bool_from_i64, ser, u32_from_i64},
};
use crate::repository::{SettingsRepository, StorageError};

#[async_trait::async_trait]
impl SettingsRepository for SqliteRepository {
    async fn get_settings(&self, topic: &TopicId) -> Result<Option<SessionSettings>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    difficulty, problem_count, time_limit_secs, max_attempts,
                    adaptive_difficulty, compensation, auto_continue, auto_continue_delay_ms
                FROM session_settings
                WHERE topic = ?1
            ",
        )
        .bind(topic.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let difficulty: i64 = row.try_get("difficulty").map_err(ser)?;
        let draft = SessionSettingsDraft {
            difficulty: u8::try_from(difficulty)
                .map_err(|_| StorageError::Serialization(format!("invalid difficulty: {difficulty}")))?,
            problem_count: u32_from_i64("problem_count", row.try_get("problem_count").map_err(ser)?)?,
            time_limit_secs: u32_from_i64(
                "time_limit_secs",
                row.try_get("time_limit_secs").map_err(ser)?,
            )?,
            max_attempts: u32_from_i64("max_attempts", row.try_get("max_attempts").map_err(ser)?)?,
            adaptive_difficulty: bool_from_i64(
                "adaptive_difficulty",
                row.try_get("adaptive_difficulty").map_err(ser)?,
            )?,
            compensation: bool_from_i64("compensation", row.try_get("compensation").map_err(ser)?)?,
            auto_continue: bool_from_i64(
                "auto_continue",
                row.try_get("auto_continue").map_err(ser)?,
            )?,
            auto_continue_delay_ms: u32_from_i64(
                "auto_continue_delay_ms",
                row.try_get("auto_continue_delay_ms").map_err(ser)?,
            )?,
        };

        SessionSettings::from_persisted(draft).map(Some).map_err(ser)
    }

    async fn save_settings(
        &self,
        topic: &TopicId,
        settings: &SessionSettings,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO session_settings (
                    topic, difficulty, problem_count, time_limit_secs, max_attempts,
                    adaptive_difficulty, compensation, auto_continue, auto_continue_delay_ms,
                    updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(topic) DO UPDATE SET
                    difficulty = excluded.difficulty,
                    problem_count = excluded.problem_count,
                    time_limit_secs = excluded.time_limit_secs,
                    max_attempts = excluded.max_attempts,
                    adaptive_difficulty = excluded.adaptive_difficulty,
                    compensation = excluded.compensation,
                    auto_continue = excluded.auto_continue,
                    auto_continue_delay_ms = excluded.auto_continue_delay_ms,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(topic.as_str())
        .bind(i64::from(settings.difficulty().level()))
        .bind(i64::from(settings.problem_count()))
        .bind(i64::from(settings.time_limit_secs()))
        .bind(i64::from(settings.max_attempts()))
        .bind(i64::from(settings.adaptive_difficulty()))
        .bind(i64::from(settings.compensation()))
        .bind(i64::from(settings.auto_continue()))
        .bind(i64::from(settings.auto_continue_delay_ms()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::debug!(topic = %topic, "saved session settings");
        Ok(())
    }
}
