#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod reporting;
pub mod sessions;

pub use quiz_core::Clock;
pub use sessions as session;

pub use app_services::AppServices;
pub use error::{AppServicesError, PersistenceError, ReportError, SessionError};
pub use reporting::{
    FanoutSink, HistoryReportSink, HttpReportConfig, HttpReportSink, NullReportSink, ReportSink,
};
pub use sessions::{
    AdvanceOutcome, Feedback, LiveSession, QuizService, QuizSession, SessionHistoryService,
    SessionKind, SessionPhase, SessionSummary, SubmitResponse, TickOutcome, Transition,
};
