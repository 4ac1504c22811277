use quiz_core::model::{QuizMode, ReaskLevel};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn parse_level(s: &str) -> Result<ReaskLevel, StorageError> {
    match s {
        "low" => Ok(ReaskLevel::Low),
        "medium" => Ok(ReaskLevel::Medium),
        _ => Err(StorageError::Serialization(format!("invalid level: {s}"))),
    }
}

pub(crate) fn parse_mode(s: &str) -> Result<QuizMode, StorageError> {
    s.parse().map_err(ser)
}
