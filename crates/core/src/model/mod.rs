mod answer;
mod bank;
mod confidence;
mod ids;
mod outcome;
mod question;
mod session;
mod settings;

pub use ids::{ChoiceId, ParseIdError, QuestionId, TopicId};

pub use answer::{Answer, AnswerKey, AnswerShapeError};
pub use bank::{BankError, QuestionBank, QuestionFilter};
pub use confidence::{Confidence, ConfidenceError, ReaskLevel};
pub use outcome::{AnswerOutcome, Verdict};
pub use question::{
    Choice, Difficulty, Question, QuestionBody, QuestionDraft, QuestionError, QuestionKind,
    Rationale, ReviewLink,
};
pub use session::{
    ConfidenceHistogram, MASTERY_SCORE_THRESHOLD, QuizMode, SessionReport, SessionReportError,
};
pub use settings::{QuizSettings, SettingsError};
