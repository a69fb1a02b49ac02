use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the schema migrations in order, skipping versions already applied.
///
/// Version 1 creates per-topic session settings and session summaries.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_settings (
                    topic TEXT PRIMARY KEY,
                    difficulty INTEGER NOT NULL CHECK (difficulty >= 1),
                    problem_count INTEGER NOT NULL CHECK (problem_count >= 1),
                    time_limit_secs INTEGER NOT NULL CHECK (time_limit_secs >= 0),
                    max_attempts INTEGER NOT NULL CHECK (max_attempts >= 0),
                    adaptive_difficulty INTEGER NOT NULL CHECK (adaptive_difficulty IN (0, 1)),
                    compensation INTEGER NOT NULL CHECK (compensation IN (0, 1)),
                    auto_continue INTEGER NOT NULL CHECK (auto_continue IN (0, 1)),
                    auto_continue_delay_ms INTEGER NOT NULL CHECK (auto_continue_delay_ms >= 0),
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_summaries (
                    id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL UNIQUE,
                    topic TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    completed_at TEXT NOT NULL,
                    total_problems INTEGER NOT NULL CHECK (total_problems >= 0),
                    correct INTEGER NOT NULL CHECK (correct >= 0),
                    incorrect INTEGER NOT NULL CHECK (incorrect >= 0),
                    revealed INTEGER NOT NULL CHECK (revealed >= 0),
                    timed_out INTEGER NOT NULL CHECK (timed_out >= 0),
                    time_spent_ms INTEGER NOT NULL CHECK (time_spent_ms >= 0),
                    start_difficulty INTEGER NOT NULL,
                    end_difficulty INTEGER NOT NULL,
                    best_streak INTEGER NOT NULL CHECK (best_streak >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_summaries_topic_completed
                    ON session_summaries (topic, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
