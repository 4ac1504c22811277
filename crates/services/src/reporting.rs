//! Delivery of completed-session reports to collaborators.
//!
//! The workflow hands each report to one `ReportSink` after completion and
//! never waits on the outcome; sinks only have to be safe to call from a
//! spawned task.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use quiz_core::model::SessionReport;
use storage::repository::SessionReportRepository;

use crate::error::ReportError;

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Hand one report to the collaborator.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the report could not be delivered.
    async fn deliver(&self, report: &SessionReport) -> Result<(), ReportError>;
}

//
// ─── HISTORY ───────────────────────────────────────────────────────────────────
//

/// Appends reports to the local history, keeping the newest `cap`.
#[derive(Clone)]
pub struct HistoryReportSink {
    reports: Arc<dyn SessionReportRepository>,
    cap: u32,
}

impl HistoryReportSink {
    #[must_use]
    pub fn new(reports: Arc<dyn SessionReportRepository>, cap: u32) -> Self {
        Self { reports, cap }
    }
}

#[async_trait]
impl ReportSink for HistoryReportSink {
    async fn deliver(&self, report: &SessionReport) -> Result<(), ReportError> {
        let id = self.reports.append_report(report).await?;
        let pruned = self.reports.prune_reports(self.cap).await?;
        debug!(id, pruned, topic = %report.topic_id(), "report stored");
        Ok(())
    }
}

//
// ─── HTTP ──────────────────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct HttpReportConfig {
    pub url: String,
    pub token: Option<String>,
}

impl HttpReportConfig {
    /// Build from optional settings (typically `QUIZ_REPORT_URL` and
    /// `QUIZ_REPORT_TOKEN`). Blank values count as unset; no URL means no
    /// HTTP reporting.
    #[must_use]
    pub fn from_parts(url: Option<String>, token: Option<String>) -> Option<Self> {
        let url = url.map(|u| u.trim().to_owned()).filter(|u| !u.is_empty())?;
        let token = token.filter(|t| !t.trim().is_empty());
        Some(Self { url, token })
    }
}

/// POSTs the camelCase JSON report to a collaborator endpoint.
#[derive(Clone)]
pub struct HttpReportSink {
    client: Client,
    config: HttpReportConfig,
}

impl HttpReportSink {
    #[must_use]
    pub fn new(config: HttpReportConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn deliver(&self, report: &SessionReport) -> Result<(), ReportError> {
        let mut request = self.client.post(&self.config.url).json(report);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ReportError::HttpStatus(response.status()));
        }
        debug!(url = %self.config.url, "report posted");
        Ok(())
    }
}

//
// ─── COMBINATORS ───────────────────────────────────────────────────────────────
//

/// Delivers to every inner sink even when some fail.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ReportSink for FanoutSink {
    async fn deliver(&self, report: &SessionReport) -> Result<(), ReportError> {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(err) = sink.deliver(report).await {
                warn!(error = %err, "report sink failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(ReportError::Partial {
                failed,
                total: self.sinks.len(),
            });
        }
        Ok(())
    }
}

/// Discards reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReportSink;

#[async_trait]
impl ReportSink for NullReportSink {
    async fn deliver(&self, _report: &SessionReport) -> Result<(), ReportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{ConfidenceHistogram, QuizMode, TopicId};
    use quiz_core::time::fixed_now;
    use storage::repository::InMemoryRepository;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> SessionReport {
        SessionReport::from_persisted(
            TopicId::new("cardiac"),
            QuizMode::Exam,
            0.8,
            4,
            5,
            300,
            ConfidenceHistogram::default(),
            fixed_now(),
        )
        .unwrap()
    }

    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        async fn deliver(&self, _report: &SessionReport) -> Result<(), ReportError> {
            Err(ReportError::Partial {
                failed: 1,
                total: 1,
            })
        }
    }

    #[tokio::test]
    async fn http_sink_posts_camel_case_json_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reports"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "topicId": "cardiac",
                "mode": "exam",
                "correctCount": 4,
                "total": 5,
                "elapsedSeconds": 300
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpReportSink::new(HttpReportConfig {
            url: format!("{}/reports", server.uri()),
            token: Some("secret".into()),
        });
        sink.deliver(&report()).await.unwrap();
    }

    #[test]
    fn blank_report_settings_disable_http() {
        assert!(HttpReportConfig::from_parts(None, Some("secret".into())).is_none());
        assert!(HttpReportConfig::from_parts(Some("  ".into()), None).is_none());

        let config =
            HttpReportConfig::from_parts(Some(" https://example.test/r ".into()), Some(" ".into()))
                .unwrap();
        assert_eq!(config.url, "https://example.test/r");
        assert_eq!(config.token, None);
    }

    #[tokio::test]
    async fn http_sink_surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = HttpReportSink::new(HttpReportConfig {
            url: server.uri(),
            token: None,
        });
        let err = sink.deliver(&report()).await.unwrap_err();
        assert!(matches!(err, ReportError::HttpStatus(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn history_sink_prunes_to_cap() {
        let repo = Arc::new(InMemoryRepository::new());
        let sink = HistoryReportSink::new(repo.clone(), 2);
        for _ in 0..3 {
            sink.deliver(&report()).await.unwrap();
        }
        let rows = repo.list_reports(None, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn fanout_isolates_failures() {
        let repo = Arc::new(InMemoryRepository::new());
        let fanout = FanoutSink::default()
            .with(Arc::new(FailingSink))
            .with(Arc::new(HistoryReportSink::new(repo.clone(), 10)));

        let err = fanout.deliver(&report()).await.unwrap_err();
        assert!(matches!(err, ReportError::Partial { failed: 1, total: 2 }));
        assert_eq!(repo.list_reports(None, 10).await.unwrap().len(), 1);
    }
}
