//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionId, SessionReportError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by session services.
///
/// Invalid caller events are not errors; they come back as
/// `Transition::Ignored`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions match the selection")]
    Empty,
    #[error("session is not completed")]
    NotCompleted,
    #[error("no missed questions to review")]
    NothingToReview,
    #[error("question {0} is not in the bank")]
    UnknownQuestion(QuestionId),
    #[error("saved session is inconsistent: {0}")]
    CorruptSnapshot(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the resumable-session store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("unsupported saved session version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Restore(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by reporting sinks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("report endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("{failed} of {total} report sinks failed")]
    Partial { failed: usize, total: usize },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Report(#[from] SessionReportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
