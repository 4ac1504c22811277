use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while parsing confidence input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfidenceError {
    #[error("invalid confidence value: {0:?}")]
    Invalid(String),
}

//
// ─── CONFIDENCE ───────────────────────────────────────────────────────────────
//

/// Self-reported certainty after answering a practice question.
///
/// - `Low` and `Medium` put the question on the topic's re-ask list
/// - `High` takes it off again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = ConfidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" | "1" => Ok(Self::Low),
            "medium" | "m" | "2" => Ok(Self::Medium),
            "high" | "h" | "3" => Ok(Self::High),
            _ => Err(ConfidenceError::Invalid(s.to_owned())),
        }
    }
}

//
// ─── RE-ASK LEVEL ─────────────────────────────────────────────────────────────
//

/// The subset of `Confidence` that the re-ask tracker stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaskLevel {
    Low,
    Medium,
}

impl ReaskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReaskLevel::Low => "low",
            ReaskLevel::Medium => "medium",
        }
    }
}

impl TryFrom<Confidence> for ReaskLevel {
    type Error = Confidence;

    fn try_from(value: Confidence) -> Result<Self, Self::Error> {
        match value {
            Confidence::Low => Ok(Self::Low),
            Confidence::Medium => Ok(Self::Medium),
            Confidence::High => Err(value),
        }
    }
}

impl FromStr for ReaskLevel {
    type Err = ConfidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let confidence: Confidence = s.parse()?;
        Self::try_from(confidence).map_err(|_| ConfidenceError::Invalid(s.to_owned()))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!("h".parse::<Confidence>().unwrap(), Confidence::High);
        assert_eq!(" Medium ".parse::<Confidence>().unwrap(), Confidence::Medium);
        assert_eq!("1".parse::<Confidence>().unwrap(), Confidence::Low);
        assert!("sure".parse::<Confidence>().is_err());
    }

    #[test]
    fn high_confidence_is_not_a_reask_level() {
        assert_eq!(ReaskLevel::try_from(Confidence::Low), Ok(ReaskLevel::Low));
        assert_eq!(ReaskLevel::try_from(Confidence::High), Err(Confidence::High));
        assert!("high".parse::<ReaskLevel>().is_err());
    }
}
