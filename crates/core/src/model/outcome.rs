use serde::{Deserialize, Serialize};

use crate::model::answer::{Answer, AnswerKey};
use crate::model::question::{Question, QuestionKind};

/// Terse correctness indicator, as shown in exam mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Partial,
    Incorrect,
}

/// Graded result for one question.
///
/// `correct` implies `partial_score == 1.0`. Single-answer questions only ever
/// score `0.0` or `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub kind: QuestionKind,
    pub correct: bool,
    pub partial_score: f64,
    /// `None` when the question was never answered (skipped or timed out).
    pub user_answer: Option<Answer>,
    pub correct_answer: AnswerKey,
}

impl AnswerOutcome {
    /// Outcome for a question that received no answer.
    #[must_use]
    pub fn unanswered(question: &Question) -> Self {
        Self {
            kind: question.kind(),
            correct: false,
            partial_score: 0.0,
            user_answer: None,
            correct_answer: question.answer_key(),
        }
    }

    /// Contribution to the session's aggregate score.
    #[must_use]
    pub fn credit(&self) -> f64 {
        if self.correct { 1.0 } else { self.partial_score }
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.correct {
            Verdict::Correct
        } else if self.kind.supports_partial_credit() && self.partial_score > 0.0 {
            Verdict::Partial
        } else {
            Verdict::Incorrect
        }
    }

    #[must_use]
    pub fn was_answered(&self) -> bool {
        self.user_answer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::ChoiceId;
    use crate::model::question::{Choice, QuestionBody, QuestionDraft};

    #[test]
    fn unanswered_scores_zero() {
        let q = QuestionDraft::new(
            "q",
            "t",
            "s",
            QuestionBody::Single {
                choices: vec![Choice::new("a", "A")],
                key: ChoiceId::new("a"),
            },
        )
        .validate()
        .unwrap();

        let outcome = AnswerOutcome::unanswered(&q);
        assert!(!outcome.correct);
        assert_eq!(outcome.credit(), 0.0);
        assert_eq!(outcome.verdict(), Verdict::Incorrect);
        assert!(!outcome.was_answered());
    }

    #[test]
    fn partial_verdict_requires_partial_kind() {
        let outcome = AnswerOutcome {
            kind: QuestionKind::Grid,
            correct: false,
            partial_score: 0.5,
            user_answer: None,
            correct_answer: AnswerKey::Grid(Default::default()),
        };
        assert_eq!(outcome.verdict(), Verdict::Partial);
        assert_eq!(outcome.credit(), 0.5);
    }
}
