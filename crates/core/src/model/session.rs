use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Confidence, TopicId};

/// Score an external mastery tracker expects before awarding exam progress.
///
/// The engine never applies this itself; see `SessionReport::meets_threshold`.
pub const MASTERY_SCORE_THRESHOLD: f64 = 0.70;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionReportError {
    #[error("score must be within [0, 1], got {0}")]
    ScoreOutOfRange(f64),

    #[error("correct count ({correct}) exceeds total ({total})")]
    CountMismatch { correct: u32, total: u32 },

    #[error("confidence ratings ({rated}) exceed total ({total})")]
    HistogramOverflow { rated: u32, total: u32 },

    #[error("invalid quiz mode: {0:?}")]
    InvalidMode(String),
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// How a session releases feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    /// Feedback after every question, confidence captured, untimed.
    Practice,
    /// Feedback withheld until the end, countdown timer.
    Exam,
}

impl QuizMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuizMode::Practice => "practice",
            QuizMode::Exam => "exam",
        }
    }
}

impl fmt::Display for QuizMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizMode {
    type Err = SessionReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" => Ok(Self::Practice),
            "exam" => Ok(Self::Exam),
            _ => Err(SessionReportError::InvalidMode(s.to_owned())),
        }
    }
}

//
// ─── CONFIDENCE HISTOGRAM ──────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceHistogram {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl ConfidenceHistogram {
    #[must_use]
    pub fn from_ratings<'a>(ratings: impl IntoIterator<Item = &'a Confidence>) -> Self {
        let mut histogram = Self::default();
        for rating in ratings {
            histogram.record(*rating);
        }
        histogram
    }

    pub fn record(&mut self, rating: Confidence) {
        match rating {
            Confidence::Low => self.low = self.low.saturating_add(1),
            Confidence::Medium => self.medium = self.medium.saturating_add(1),
            Confidence::High => self.high = self.high.saturating_add(1),
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.low
            .saturating_add(self.medium)
            .saturating_add(self.high)
    }
}

//
// ─── SESSION REPORT ────────────────────────────────────────────────────────────
//

/// Summary of a completed session, handed to reporting sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    topic_id: TopicId,
    mode: QuizMode,
    score: f64,
    correct_count: u32,
    total: u32,
    elapsed_seconds: u64,
    confidence_histogram: ConfidenceHistogram,
    completed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionReportRecord {
    topic_id: TopicId,
    mode: QuizMode,
    score: f64,
    correct_count: u32,
    total: u32,
    elapsed_seconds: u64,
    #[serde(default)]
    confidence_histogram: ConfidenceHistogram,
    completed_at: DateTime<Utc>,
}

impl<'de> Deserialize<'de> for SessionReport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let r = SessionReportRecord::deserialize(deserializer)?;
        Self::from_persisted(
            r.topic_id,
            r.mode,
            r.score,
            r.correct_count,
            r.total,
            r.elapsed_seconds,
            r.confidence_histogram,
            r.completed_at,
        )
        .map_err(serde::de::Error::custom)
    }
}

impl SessionReport {
    /// Rehydrate or build a report, checking that counts line up.
    ///
    /// # Errors
    ///
    /// Returns `SessionReportError` if the score is outside `[0, 1]` or a count
    /// exceeds the question total.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        topic_id: TopicId,
        mode: QuizMode,
        score: f64,
        correct_count: u32,
        total: u32,
        elapsed_seconds: u64,
        confidence_histogram: ConfidenceHistogram,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, SessionReportError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(SessionReportError::ScoreOutOfRange(score));
        }
        if correct_count > total {
            return Err(SessionReportError::CountMismatch {
                correct: correct_count,
                total,
            });
        }
        let rated = confidence_histogram.total();
        if rated > total {
            return Err(SessionReportError::HistogramOverflow { rated, total });
        }

        Ok(Self {
            topic_id,
            mode,
            score,
            correct_count,
            total,
            elapsed_seconds,
            confidence_histogram,
            completed_at,
        })
    }

    #[must_use]
    pub fn topic_id(&self) -> &TopicId {
        &self.topic_id
    }

    #[must_use]
    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    /// Aggregate fractional score in `[0, 1]`, partial credit included.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn confidence_histogram(&self) -> ConfidenceHistogram {
        self.confidence_histogram
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Collaborator-side mastery rule: exam mode at or above `threshold`.
    #[must_use]
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.mode == QuizMode::Exam && self.score >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn report(mode: QuizMode, score: f64) -> SessionReport {
        SessionReport::from_persisted(
            TopicId::new("copd"),
            mode,
            score,
            3,
            4,
            120,
            ConfidenceHistogram::default(),
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn histogram_counts_ratings() {
        let ratings = [Confidence::Low, Confidence::High, Confidence::High];
        let histogram = ConfidenceHistogram::from_ratings(&ratings);
        assert_eq!(histogram.low, 1);
        assert_eq!(histogram.medium, 0);
        assert_eq!(histogram.high, 2);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn rejects_inconsistent_counts() {
        let err = SessionReport::from_persisted(
            TopicId::new("copd"),
            QuizMode::Exam,
            0.5,
            5,
            4,
            0,
            ConfidenceHistogram::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionReportError::CountMismatch { .. }));

        let err = SessionReport::from_persisted(
            TopicId::new("copd"),
            QuizMode::Exam,
            1.5,
            1,
            4,
            0,
            ConfidenceHistogram::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionReportError::ScoreOutOfRange(_)));
    }

    #[test]
    fn threshold_only_counts_exam_mode() {
        assert!(report(QuizMode::Exam, 0.75).meets_threshold(MASTERY_SCORE_THRESHOLD));
        assert!(report(QuizMode::Exam, 0.70).meets_threshold(MASTERY_SCORE_THRESHOLD));
        assert!(!report(QuizMode::Exam, 0.65).meets_threshold(MASTERY_SCORE_THRESHOLD));
        assert!(!report(QuizMode::Practice, 1.0).meets_threshold(MASTERY_SCORE_THRESHOLD));
    }

    #[test]
    fn serializes_camel_case_wire_shape() {
        let json = serde_json::to_value(report(QuizMode::Exam, 0.75)).unwrap();
        assert_eq!(json["topicId"], "copd");
        assert_eq!(json["mode"], "exam");
        assert_eq!(json["correctCount"], 3);
        assert_eq!(json["elapsedSeconds"], 120);
        assert_eq!(json["confidenceHistogram"]["low"], 0);

        let back: SessionReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.score(), 0.75);
    }
}
