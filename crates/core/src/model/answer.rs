use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ChoiceId;
use crate::model::question::{Question, QuestionKind};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons a candidate answer is not yet submittable for a question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerShapeError {
    #[error("expected a {expected} answer, got {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("no choice selected")]
    Empty,

    #[error("unknown choice {0}")]
    UnknownChoice(ChoiceId),

    #[error("choice {0} appears more than once")]
    DuplicateChoice(ChoiceId),

    #[error("sequence has {found} steps, expected {expected}")]
    WrongLength { expected: usize, found: usize },

    #[error("grid row {0} has no selection")]
    MissingRow(ChoiceId),

    #[error("unknown grid row {0}")]
    UnknownRow(ChoiceId),

    #[error("unknown column {column:?} for row {row}")]
    UnknownColumn { row: ChoiceId, column: String },
}

//
// ─── ANSWER / KEY ──────────────────────────────────────────────────────────────
//

/// A learner's candidate answer, shaped by question kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Answer {
    Single(ChoiceId),
    SelectAll(BTreeSet<ChoiceId>),
    OrderedSequence(Vec<ChoiceId>),
    Grid(BTreeMap<ChoiceId, String>),
}

/// The canonical answer of a question; same shape as `Answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum AnswerKey {
    Single(ChoiceId),
    SelectAll(BTreeSet<ChoiceId>),
    OrderedSequence(Vec<ChoiceId>),
    Grid(BTreeMap<ChoiceId, String>),
}

impl Answer {
    #[must_use]
    pub fn single(id: impl Into<String>) -> Self {
        Self::Single(ChoiceId::new(id))
    }

    #[must_use]
    pub fn select_all<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SelectAll(ids.into_iter().map(ChoiceId::new).collect())
    }

    #[must_use]
    pub fn ordered<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OrderedSequence(ids.into_iter().map(ChoiceId::new).collect())
    }

    #[must_use]
    pub fn grid<I, R, C>(cells: I) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: Into<String>,
        C: Into<String>,
    {
        Self::Grid(
            cells
                .into_iter()
                .map(|(row, col)| (ChoiceId::new(row), col.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            Answer::Single(_) => QuestionKind::Single,
            Answer::SelectAll(_) => QuestionKind::SelectAll,
            Answer::OrderedSequence(_) => QuestionKind::OrderedSequence,
            Answer::Grid(_) => QuestionKind::Grid,
        }
    }

    /// Check that this answer is complete and well-formed for `question`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerShapeError` describing the first problem found.
    pub fn check_shape(&self, question: &Question) -> Result<(), AnswerShapeError> {
        if self.kind() != question.kind() {
            return Err(AnswerShapeError::KindMismatch {
                expected: question.kind().as_str(),
                found: self.kind().as_str(),
            });
        }

        let known = |id: &ChoiceId| -> Result<(), AnswerShapeError> {
            if question.has_choice(id) {
                Ok(())
            } else {
                Err(AnswerShapeError::UnknownChoice(id.clone()))
            }
        };

        match self {
            Answer::Single(id) => known(id),
            Answer::SelectAll(ids) => {
                if ids.is_empty() {
                    return Err(AnswerShapeError::Empty);
                }
                ids.iter().try_for_each(known)
            }
            Answer::OrderedSequence(ids) => {
                let expected = question.choices().len();
                if ids.len() != expected {
                    return Err(AnswerShapeError::WrongLength {
                        expected,
                        found: ids.len(),
                    });
                }
                let mut seen = HashSet::with_capacity(ids.len());
                for id in ids {
                    known(id)?;
                    if !seen.insert(id) {
                        return Err(AnswerShapeError::DuplicateChoice(id.clone()));
                    }
                }
                Ok(())
            }
            Answer::Grid(cells) => {
                if let Some(row) = cells.keys().find(|row| !question.has_choice(row)) {
                    return Err(AnswerShapeError::UnknownRow(row.clone()));
                }
                for row in question.choices() {
                    let Some(column) = cells.get(&row.id) else {
                        return Err(AnswerShapeError::MissingRow(row.id.clone()));
                    };
                    if !question.columns().contains(column) {
                        return Err(AnswerShapeError::UnknownColumn {
                            row: row.id.clone(),
                            column: column.clone(),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

impl AnswerKey {
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerKey::Single(_) => QuestionKind::Single,
            AnswerKey::SelectAll(_) => QuestionKind::SelectAll,
            AnswerKey::OrderedSequence(_) => QuestionKind::OrderedSequence,
            AnswerKey::Grid(_) => QuestionKind::Grid,
        }
    }

    /// The answer a learner would give to be fully correct.
    #[must_use]
    pub fn to_answer(&self) -> Answer {
        match self {
            AnswerKey::Single(id) => Answer::Single(id.clone()),
            AnswerKey::SelectAll(ids) => Answer::SelectAll(ids.clone()),
            AnswerKey::OrderedSequence(ids) => Answer::OrderedSequence(ids.clone()),
            AnswerKey::Grid(cells) => Answer::Grid(cells.clone()),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::{Choice, QuestionBody, QuestionDraft};

    fn ordered_question() -> Question {
        QuestionDraft::new(
            "o1",
            "t",
            "Order",
            QuestionBody::OrderedSequence {
                choices: vec![Choice::new("a", "A"), Choice::new("b", "B"), Choice::new("c", "C")],
                key: vec![ChoiceId::new("c"), ChoiceId::new("a"), ChoiceId::new("b")],
            },
        )
        .validate()
        .unwrap()
    }

    fn grid_question() -> Question {
        QuestionDraft::new(
            "g1",
            "t",
            "Grid",
            QuestionBody::Grid {
                rows: vec![Choice::new("r1", "Edema"), Choice::new("r2", "Fever")],
                columns: vec!["Expected".into(), "Unexpected".into()],
                key: [("r1", "Expected"), ("r2", "Unexpected")]
                    .into_iter()
                    .map(|(r, c)| (ChoiceId::new(r), c.to_owned()))
                    .collect(),
            },
        )
        .validate()
        .unwrap()
    }

    #[test]
    fn short_sequence_is_not_submittable() {
        let err = Answer::ordered(["a", "b"])
            .check_shape(&ordered_question())
            .unwrap_err();
        assert_eq!(
            err,
            AnswerShapeError::WrongLength {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn repeated_step_is_rejected() {
        let err = Answer::ordered(["a", "a", "b"])
            .check_shape(&ordered_question())
            .unwrap_err();
        assert!(matches!(err, AnswerShapeError::DuplicateChoice(_)));
    }

    #[test]
    fn grid_missing_row_is_not_submittable() {
        let err = Answer::grid([("r1", "Expected")])
            .check_shape(&grid_question())
            .unwrap_err();
        assert_eq!(err, AnswerShapeError::MissingRow(ChoiceId::new("r2")));
    }

    #[test]
    fn grid_unknown_column_is_rejected() {
        let err = Answer::grid([("r1", "Expected"), ("r2", "Maybe")])
            .check_shape(&grid_question())
            .unwrap_err();
        assert!(matches!(err, AnswerShapeError::UnknownColumn { .. }));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let err = Answer::single("a")
            .check_shape(&ordered_question())
            .unwrap_err();
        assert!(matches!(err, AnswerShapeError::KindMismatch { .. }));
    }

    #[test]
    fn key_as_answer_is_well_formed() {
        let q = grid_question();
        assert!(q.answer_key().to_answer().check_shape(&q).is_ok());
    }
}
