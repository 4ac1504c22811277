mod persistence;
mod plan;
mod progress;
mod service;
mod timer;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{PersistenceError, SessionError};
pub use persistence::{ResumeToken, SessionStore};
pub use plan::{SessionBuilder, SessionPlan, select_questions};
pub use progress::SessionProgress;
pub use service::{
    AdvanceOutcome, Feedback, FullFeedback, IgnoredReason, QuestionResult, QuizSession,
    SessionKind, SessionPhase, SessionSnapshot, SessionSummary, SessionTimer, SubmitResponse,
    TickOutcome, TimerMode, Transition,
};
pub use timer::{TimerHandle, spawn_ticker};
pub use view::{SessionHistoryItem, SessionHistoryService, SessionReportId, TopicStats};
pub use workflow::{LiveSession, QuizService};
