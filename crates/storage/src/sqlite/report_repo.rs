use async_trait::async_trait;
use quiz_core::model::{ConfidenceHistogram, SessionReport, TopicId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, i64_from_u64, parse_mode, ser, u32_from_i64, u64_from_i64};
use crate::repository::{SessionReportRepository, SessionReportRow, StorageError};

const REPORT_COLUMNS: &str = r"
    id, topic_id, mode, score, correct_count, total, elapsed_seconds,
    confidence_low, confidence_medium, confidence_high, completed_at
";

fn map_report_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionReportRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let topic_id = TopicId::new(row.try_get::<String, _>("topic_id").map_err(ser)?);
    let mode = parse_mode(&row.try_get::<String, _>("mode").map_err(ser)?)?;
    let count = |field: &'static str| -> Result<u32, StorageError> {
        u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };
    let histogram = ConfidenceHistogram {
        low: count("confidence_low")?,
        medium: count("confidence_medium")?,
        high: count("confidence_high")?,
    };

    let report = SessionReport::from_persisted(
        topic_id,
        mode,
        row.try_get("score").map_err(ser)?,
        count("correct_count")?,
        count("total")?,
        u64_from_i64(
            "elapsed_seconds",
            row.try_get::<i64, _>("elapsed_seconds").map_err(ser)?,
        )?,
        histogram,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(SessionReportRow::new(id, report))
}

#[async_trait]
impl SessionReportRepository for SqliteRepository {
    async fn append_report(&self, report: &SessionReport) -> Result<i64, StorageError> {
        let histogram = report.confidence_histogram();
        let res = sqlx::query(
            r"
                INSERT INTO session_reports (
                    topic_id, mode, score, correct_count, total, elapsed_seconds,
                    confidence_low, confidence_medium, confidence_high, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(report.topic_id().as_str())
        .bind(report.mode().as_str())
        .bind(report.score())
        .bind(i64::from(report.correct_count()))
        .bind(i64::from(report.total()))
        .bind(i64_from_u64("elapsed_seconds", report.elapsed_seconds())?)
        .bind(i64::from(histogram.low))
        .bind(i64::from(histogram.medium))
        .bind(i64::from(histogram.high))
        .bind(report.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn list_reports(
        &self,
        topic: Option<&TopicId>,
        limit: u32,
    ) -> Result<Vec<SessionReportRow>, StorageError> {
        let rows = match topic {
            Some(topic) => {
                let sql = format!(
                    "SELECT {REPORT_COLUMNS} FROM session_reports WHERE topic_id = ?1 \
                     ORDER BY completed_at DESC, id DESC LIMIT ?2"
                );
                sqlx::query(&sql)
                    .bind(topic.as_str())
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {REPORT_COLUMNS} FROM session_reports \
                     ORDER BY completed_at DESC, id DESC LIMIT ?1"
                );
                sqlx::query(&sql)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(conn)?;

        rows.iter().map(map_report_row).collect()
    }

    async fn prune_reports(&self, keep: u32) -> Result<u64, StorageError> {
        let res = sqlx::query(
            r"
                DELETE FROM session_reports
                WHERE id NOT IN (
                    SELECT id FROM session_reports
                    ORDER BY completed_at DESC, id DESC
                    LIMIT ?1
                )
            ",
        )
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected())
    }
}
