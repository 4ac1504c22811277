use std::sync::Arc;

use quiz_core::model::{QuestionBank, QuizSettings};
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::reporting::{FanoutSink, HistoryReportSink, HttpReportConfig, HttpReportSink, ReportSink};
use crate::sessions::{QuizService, SessionHistoryService};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    quiz: Arc<QuizService>,
    history: Arc<SessionHistoryService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// Reports always go to the local history; when `report` is set they are
    /// also POSTed to that endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: QuizSettings,
        bank: Arc<QuestionBank>,
        report: Option<HttpReportConfig>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, settings, bank, report))
    }

    /// Build services over an already-open storage backend.
    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        settings: QuizSettings,
        bank: Arc<QuestionBank>,
        report: Option<HttpReportConfig>,
    ) -> Self {
        let mut sink = FanoutSink::default().with(Arc::new(HistoryReportSink::new(
            Arc::clone(&storage.reports),
            settings.history_cap(),
        )));
        if let Some(config) = report {
            sink = sink.with(Arc::new(HttpReportSink::new(config)));
        }
        let sink: Arc<dyn ReportSink> = Arc::new(sink);

        let quiz = Arc::new(QuizService::new(clock, settings, bank, storage, sink));
        let history = Arc::new(SessionHistoryService::new(Arc::clone(&storage.reports)));
        Self { quiz, history }
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn history(&self) -> Arc<SessionHistoryService> {
        Arc::clone(&self.history)
    }
}
