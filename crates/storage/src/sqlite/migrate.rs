use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies the versioned schema.
///
/// Version 1 creates the resumable-session key/value table, the re-ask
/// tracker, and the session report history.
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
                CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS reask_entries (
                    topic_id TEXT NOT NULL,
                    question_id TEXT NOT NULL,
                    level TEXT NOT NULL CHECK (level IN ('low', 'medium')),
                    attempts INTEGER NOT NULL CHECK (attempts >= 0),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (topic_id, question_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_reports (
                    id INTEGER PRIMARY KEY,
                    topic_id TEXT NOT NULL,
                    mode TEXT NOT NULL CHECK (mode IN ('practice', 'exam')),
                    score REAL NOT NULL CHECK (score BETWEEN 0.0 AND 1.0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    total INTEGER NOT NULL CHECK (total >= 0),
                    elapsed_seconds INTEGER NOT NULL CHECK (elapsed_seconds >= 0),
                    confidence_low INTEGER NOT NULL CHECK (confidence_low >= 0),
                    confidence_medium INTEGER NOT NULL CHECK (confidence_medium >= 0),
                    confidence_high INTEGER NOT NULL CHECK (confidence_high >= 0),
                    completed_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_reports_topic_completed
                    ON session_reports (topic_id, completed_at);
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
    }

    Ok(())
}
