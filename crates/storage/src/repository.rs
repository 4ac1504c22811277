use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{QuestionId, ReaskLevel, SessionReport, TopicId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Tracker state for one question within one topic scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaskEntry {
    pub level: ReaskLevel,
    /// Sessions in which the question was rated low or medium.
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl ReaskEntry {
    #[must_use]
    pub fn new(level: ReaskLevel, attempts: u32, updated_at: DateTime<Utc>) -> Self {
        Self {
            level,
            attempts,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaskChange {
    Upsert(ReaskEntry),
    Remove,
}

/// One pending tracker write, applied as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaskUpdate {
    pub question_id: QuestionId,
    pub change: ReaskChange,
}

impl ReaskUpdate {
    #[must_use]
    pub fn upsert(question_id: QuestionId, entry: ReaskEntry) -> Self {
        Self {
            question_id,
            change: ReaskChange::Upsert(entry),
        }
    }

    #[must_use]
    pub fn remove(question_id: QuestionId) -> Self {
        Self {
            question_id,
            change: ReaskChange::Remove,
        }
    }
}

/// A stored report with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReportRow {
    pub id: i64,
    pub report: SessionReport,
}

impl SessionReportRow {
    #[must_use]
    pub fn new(id: i64, report: SessionReport) -> Self {
        Self { id, report }
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Opaque string store used to park resumable sessions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Cross-session list of questions to ask again, keyed by topic scope.
#[async_trait]
pub trait ReaskRepository: Send + Sync {
    /// All tracked questions for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn reask_entries(
        &self,
        topic: &TopicId,
    ) -> Result<BTreeMap<QuestionId, ReaskEntry>, StorageError>;

    /// Apply a batch of changes for `topic` all at once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; none of the batch is kept.
    async fn apply_reask_updates(
        &self,
        topic: &TopicId,
        updates: &[ReaskUpdate],
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn upsert_reask(
        &self,
        topic: &TopicId,
        question_id: &QuestionId,
        entry: ReaskEntry,
    ) -> Result<(), StorageError> {
        self.apply_reask_updates(topic, &[ReaskUpdate::upsert(question_id.clone(), entry)])
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be removed.
    async fn remove_reask(
        &self,
        topic: &TopicId,
        question_id: &QuestionId,
    ) -> Result<(), StorageError> {
        self.apply_reask_updates(topic, &[ReaskUpdate::remove(question_id.clone())])
            .await
    }
}

/// Append-only log of completed session reports.
#[async_trait]
pub trait SessionReportRepository: Send + Sync {
    /// Store a report and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the report cannot be stored.
    async fn append_report(&self, report: &SessionReport) -> Result<i64, StorageError>;

    /// Newest first, optionally restricted to one topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or a row is corrupt.
    async fn list_reports(
        &self,
        topic: Option<&TopicId>,
        limit: u32,
    ) -> Result<Vec<SessionReportRow>, StorageError>;

    /// Keep only the newest `keep` reports. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn prune_reports(&self, keep: u32) -> Result<u64, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct ReportLog {
    next_id: i64,
    rows: Vec<SessionReportRow>,
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    kv: Arc<Mutex<HashMap<String, String>>>,
    reask: Arc<Mutex<HashMap<TopicId, BTreeMap<QuestionId, ReaskEntry>>>>,
    reports: Arc<Mutex<ReportLog>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .kv
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .kv
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .kv
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ReaskRepository for InMemoryRepository {
    async fn reask_entries(
        &self,
        topic: &TopicId,
    ) -> Result<BTreeMap<QuestionId, ReaskEntry>, StorageError> {
        let guard = self
            .reask
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(topic).cloned().unwrap_or_default())
    }

    async fn apply_reask_updates(
        &self,
        topic: &TopicId,
        updates: &[ReaskUpdate],
    ) -> Result<(), StorageError> {
        let mut guard = self
            .reask
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let entries = guard.entry(topic.clone()).or_default();
        for update in updates {
            match &update.change {
                ReaskChange::Upsert(entry) => {
                    entries.insert(update.question_id.clone(), *entry);
                }
                ReaskChange::Remove => {
                    entries.remove(&update.question_id);
                }
            }
        }
        if entries.is_empty() {
            guard.remove(topic);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionReportRepository for InMemoryRepository {
    async fn append_report(&self, report: &SessionReport) -> Result<i64, StorageError> {
        let mut guard = self
            .reports
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.next_id += 1;
        let id = guard.next_id;
        guard.rows.push(SessionReportRow::new(id, report.clone()));
        Ok(id)
    }

    async fn list_reports(
        &self,
        topic: Option<&TopicId>,
        limit: u32,
    ) -> Result<Vec<SessionReportRow>, StorageError> {
        let guard = self
            .reports
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<_> = guard
            .rows
            .iter()
            .filter(|row| topic.is_none_or(|t| row.report.topic_id() == t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.report
                .completed_at()
                .cmp(&a.report.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn prune_reports(&self, keep: u32) -> Result<u64, StorageError> {
        let mut guard = self
            .reports
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let keep = usize::try_from(keep).unwrap_or(usize::MAX);
        if guard.rows.len() <= keep {
            return Ok(0);
        }
        guard.rows.sort_by(|a, b| {
            b.report
                .completed_at()
                .cmp(&a.report.completed_at())
                .then(b.id.cmp(&a.id))
        });
        let removed = guard.rows.len() - keep;
        guard.rows.truncate(keep);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
    pub reask: Arc<dyn ReaskRepository>,
    pub reports: Arc<dyn SessionReportRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let kv: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
        let reask: Arc<dyn ReaskRepository> = Arc::new(repo.clone());
        let reports: Arc<dyn SessionReportRepository> = Arc::new(repo);
        Self { kv, reask, reports }
    }
}
