use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("session size must be at least 1")]
    InvalidSessionSize,

    #[error("exam time per question must be at least 1 second")]
    InvalidExamBudget,

    #[error("resume expiry must be between 1 and 168 hours")]
    InvalidResumeTtl,

    #[error("re-ask attempts must be at least 1")]
    InvalidReaskAttempts,

    #[error("history cap must be at least 1")]
    InvalidHistoryCap,
}

/// Engine-wide knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    session_size: u32,
    exam_seconds_per_question: u32,
    resume_ttl_hours: u32,
    reask_max_attempts: u32,
    history_cap: u32,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            session_size: 10,
            exam_seconds_per_question: 90,
            resume_ttl_hours: 24,
            reask_max_attempts: 3,
            history_cap: 200,
        }
    }
}

impl QuizSettings {
    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if any value is zero or the resume expiry is
    /// longer than a week.
    pub fn new(
        session_size: u32,
        exam_seconds_per_question: u32,
        resume_ttl_hours: u32,
        reask_max_attempts: u32,
        history_cap: u32,
    ) -> Result<Self, SettingsError> {
        if session_size == 0 {
            return Err(SettingsError::InvalidSessionSize);
        }
        if exam_seconds_per_question == 0 {
            return Err(SettingsError::InvalidExamBudget);
        }
        if !(1..=168).contains(&resume_ttl_hours) {
            return Err(SettingsError::InvalidResumeTtl);
        }
        if reask_max_attempts == 0 {
            return Err(SettingsError::InvalidReaskAttempts);
        }
        if history_cap == 0 {
            return Err(SettingsError::InvalidHistoryCap);
        }

        Ok(Self {
            session_size,
            exam_seconds_per_question,
            resume_ttl_hours,
            reask_max_attempts,
            history_cap,
        })
    }

    #[must_use]
    pub fn session_size(&self) -> u32 {
        self.session_size
    }

    #[must_use]
    pub fn exam_seconds_per_question(&self) -> u32 {
        self.exam_seconds_per_question
    }

    #[must_use]
    pub fn resume_ttl_hours(&self) -> u32 {
        self.resume_ttl_hours
    }

    #[must_use]
    pub fn resume_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.resume_ttl_hours))
    }

    /// How many times a question may be re-rated low/medium before it is
    /// dropped from the re-ask list.
    #[must_use]
    pub fn reask_max_attempts(&self) -> u32 {
        self.reask_max_attempts
    }

    #[must_use]
    pub fn history_cap(&self) -> u32 {
        self.history_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_exam_conventions() {
        let s = QuizSettings::default();
        assert_eq!(s.session_size(), 10);
        assert_eq!(s.exam_seconds_per_question(), 90);
        assert_eq!(s.resume_ttl(), Duration::hours(24));
        assert_eq!(s.reask_max_attempts(), 3);
        assert_eq!(s.history_cap(), 200);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert_eq!(
            QuizSettings::new(0, 90, 24, 3, 200),
            Err(SettingsError::InvalidSessionSize)
        );
        assert_eq!(
            QuizSettings::new(10, 0, 24, 3, 200),
            Err(SettingsError::InvalidExamBudget)
        );
        assert_eq!(
            QuizSettings::new(10, 90, 200, 3, 200),
            Err(SettingsError::InvalidResumeTtl)
        );
        assert_eq!(
            QuizSettings::new(10, 90, 24, 0, 200),
            Err(SettingsError::InvalidReaskAttempts)
        );
        assert_eq!(
            QuizSettings::new(10, 90, 24, 3, 0),
            Err(SettingsError::InvalidHistoryCap)
        );
    }
}
