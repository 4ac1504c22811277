use std::collections::BTreeMap;

use async_trait::async_trait;
use quiz_core::model::{QuestionId, TopicId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, parse_level, ser, u32_from_i64};
use crate::repository::{ReaskChange, ReaskEntry, ReaskRepository, ReaskUpdate, StorageError};

#[async_trait]
impl ReaskRepository for SqliteRepository {
    async fn reask_entries(
        &self,
        topic: &TopicId,
    ) -> Result<BTreeMap<QuestionId, ReaskEntry>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT question_id, level, attempts, updated_at
                FROM reask_entries
                WHERE topic_id = ?1
            ",
        )
        .bind(topic.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = BTreeMap::new();
        for row in rows {
            let question_id = QuestionId::new(row.try_get::<String, _>("question_id").map_err(ser)?);
            let level = parse_level(&row.try_get::<String, _>("level").map_err(ser)?)?;
            let attempts = u32_from_i64("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?;
            let updated_at = row.try_get("updated_at").map_err(ser)?;
            out.insert(question_id, ReaskEntry::new(level, attempts, updated_at));
        }
        Ok(out)
    }

    async fn apply_reask_updates(
        &self,
        topic: &TopicId,
        updates: &[ReaskUpdate],
    ) -> Result<(), StorageError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(conn)?;
        for update in updates {
            match &update.change {
                ReaskChange::Upsert(entry) => {
                    sqlx::query(
                        r"
                            INSERT INTO reask_entries (topic_id, question_id, level, attempts, updated_at)
                            VALUES (?1, ?2, ?3, ?4, ?5)
                            ON CONFLICT(topic_id, question_id) DO UPDATE SET
                                level = excluded.level,
                                attempts = excluded.attempts,
                                updated_at = excluded.updated_at
                        ",
                    )
                    .bind(topic.as_str())
                    .bind(update.question_id.as_str())
                    .bind(entry.level.as_str())
                    .bind(i64::from(entry.attempts))
                    .bind(entry.updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(conn)?;
                }
                ReaskChange::Remove => {
                    sqlx::query(
                        "DELETE FROM reask_entries WHERE topic_id = ?1 AND question_id = ?2",
                    )
                    .bind(topic.as_str())
                    .bind(update.question_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(conn)?;
                }
            }
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
