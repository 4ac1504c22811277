use chrono::{DateTime, Utc};
use std::sync::Arc;

use quiz_core::model::{ConfidenceHistogram, QuizMode, TopicId};
use storage::repository::{SessionReportRepository, SessionReportRow};

use crate::error::SessionError;

/// Storage identifier for a stored session report.
///
/// NOTE: This is `i64` to match `SQLite` row IDs.
pub type SessionReportId = i64;

/// Presentation-agnostic list item for one stored report.
///
/// No pre-formatted strings; callers format scores and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHistoryItem {
    pub id: SessionReportId,
    pub topic_id: TopicId,
    pub mode: QuizMode,
    pub score: f64,
    pub correct_count: u32,
    pub total: u32,
    pub elapsed_seconds: u64,
    pub confidence_histogram: ConfidenceHistogram,
    pub completed_at: DateTime<Utc>,
}

impl SessionHistoryItem {
    #[must_use]
    pub fn from_row(row: &SessionReportRow) -> Self {
        let report = &row.report;
        Self {
            id: row.id,
            topic_id: report.topic_id().clone(),
            mode: report.mode(),
            score: report.score(),
            correct_count: report.correct_count(),
            total: report.total(),
            elapsed_seconds: report.elapsed_seconds(),
            confidence_histogram: report.confidence_histogram(),
            completed_at: report.completed_at(),
        }
    }
}

/// Aggregates over every stored report of one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicStats {
    pub attempts: u32,
    pub avg_score: f64,
    pub best_score: f64,
    /// Score of the most recent attempt.
    pub last_score: f64,
    pub total_seconds: u64,
}

impl TopicStats {
    fn from_items(items: &[SessionHistoryItem]) -> Option<Self> {
        // Newest first.
        let last = items.first()?;
        let attempts = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let sum: f64 = items.iter().map(|i| i.score).sum();
        let best_score = items.iter().map(|i| i.score).fold(0.0, f64::max);
        Some(Self {
            attempts,
            avg_score: sum / f64::from(attempts),
            best_score,
            last_score: last.score,
            total_seconds: items.iter().map(|i| i.elapsed_seconds).sum(),
        })
    }
}

/// Read-only queries over the session history.
#[derive(Clone)]
pub struct SessionHistoryService {
    reports: Arc<dyn SessionReportRepository>,
}

impl SessionHistoryService {
    #[must_use]
    pub fn new(reports: Arc<dyn SessionReportRepository>) -> Self {
        Self { reports }
    }

    /// Most recent reports first, optionally for one topic.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn list_recent(
        &self,
        topic: Option<&TopicId>,
        limit: u32,
    ) -> Result<Vec<SessionHistoryItem>, SessionError> {
        let rows = self.reports.list_reports(topic, limit).await?;
        Ok(rows.iter().map(SessionHistoryItem::from_row).collect())
    }

    /// Stats for `topic`, or `None` before its first completed session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn topic_stats(&self, topic: &TopicId) -> Result<Option<TopicStats>, SessionError> {
        let items = self.list_recent(Some(topic), u32::MAX).await?;
        Ok(TopicStats::from_items(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::SessionReport;
    use quiz_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn report(topic: &str, correct: u32, elapsed: u64, minutes: i64) -> SessionReport {
        SessionReport::from_persisted(
            TopicId::new(topic),
            QuizMode::Practice,
            f64::from(correct) / 4.0,
            correct,
            4,
            elapsed,
            ConfidenceHistogram::default(),
            fixed_now() + Duration::minutes(minutes),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn topic_stats_aggregate_history() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.append_report(&report("cardiac", 2, 100, 0)).await.unwrap();
        repo.append_report(&report("renal", 4, 50, 1)).await.unwrap();
        repo.append_report(&report("cardiac", 4, 120, 2)).await.unwrap();
        repo.append_report(&report("cardiac", 3, 80, 3)).await.unwrap();

        let service = SessionHistoryService::new(repo);
        let stats = service
            .topic_stats(&TopicId::new("cardiac"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.attempts, 3);
        assert!((stats.avg_score - 0.75).abs() < 1e-9);
        assert_eq!(stats.best_score, 1.0);
        assert_eq!(stats.last_score, 0.75);
        assert_eq!(stats.total_seconds, 300);

        let recent = service.list_recent(None, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].correct_count, 3);
    }

    #[tokio::test]
    async fn no_history_yields_no_stats() {
        let service = SessionHistoryService::new(Arc::new(InMemoryRepository::new()));
        assert!(
            service
                .topic_stats(&TopicId::new("neuro"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
