use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerKey;
use crate::model::ids::{ChoiceId, QuestionId, TopicId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Malformed question records. These are rejected when a bank is built and
/// never reach a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question {0} has an empty stem")]
    EmptyStem(QuestionId),

    #[error("question {0} has no choices")]
    NoChoices(QuestionId),

    #[error("question {question} repeats choice {choice}")]
    DuplicateChoice {
        question: QuestionId,
        choice: ChoiceId,
    },

    #[error("question {question} keys unknown choice {choice}")]
    UnknownKeyChoice {
        question: QuestionId,
        choice: ChoiceId,
    },

    #[error("question {0} has an empty answer key")]
    EmptyKey(QuestionId),

    #[error("question {0}: ordered key must be a permutation of the choices")]
    OrderedKeyNotPermutation(QuestionId),

    #[error("question {0}: grid has no columns")]
    NoColumns(QuestionId),

    #[error("question {question}: grid row {row} has no keyed column")]
    UnkeyedRow { question: QuestionId, row: ChoiceId },

    #[error("question {question}: row {row} keys unknown column {column:?}")]
    UnknownColumn {
        question: QuestionId,
        row: ChoiceId,
        column: String,
    },
}

//
// ─── ENUMS ─────────────────────────────────────────────────────────────────────
//

/// The four supported question formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Single best answer.
    Single,
    /// Select all that apply.
    SelectAll,
    /// Put the steps in the right order.
    OrderedSequence,
    /// One column label per row.
    Grid,
}

impl QuestionKind {
    /// Whether grading may award a fractional score for this kind.
    #[must_use]
    pub fn supports_partial_credit(self) -> bool {
        !matches!(self, QuestionKind::Single)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::SelectAll => "select-all",
            QuestionKind::OrderedSequence => "ordered-sequence",
            QuestionKind::Grid => "grid",
        }
    }
}

/// NCLEX cognitive level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Knowledge,
    Application,
    Analysis,
}

//
// ─── SUPPORTING RECORDS ────────────────────────────────────────────────────────
//

/// An answer option (or a grid row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
}

impl Choice {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: ChoiceId::new(id),
            text: text.into(),
        }
    }
}

/// Explanations shown with full feedback. Opaque to grading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rationale {
    #[serde(default)]
    pub correct: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<ChoiceId, String>,
}

/// Link back to the study-guide section covering the question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLink {
    pub section_id: String,
    pub title: String,
}

/// Type-specific choices and answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionBody {
    Single {
        choices: Vec<Choice>,
        key: ChoiceId,
    },
    SelectAll {
        choices: Vec<Choice>,
        key: BTreeSet<ChoiceId>,
    },
    OrderedSequence {
        choices: Vec<Choice>,
        key: Vec<ChoiceId>,
    },
    Grid {
        rows: Vec<Choice>,
        columns: Vec<String>,
        key: BTreeMap<ChoiceId, String>,
    },
}

impl QuestionBody {
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionBody::Single { .. } => QuestionKind::Single,
            QuestionBody::SelectAll { .. } => QuestionKind::SelectAll,
            QuestionBody::OrderedSequence { .. } => QuestionKind::OrderedSequence,
            QuestionBody::Grid { .. } => QuestionKind::Grid,
        }
    }

    fn choices(&self) -> &[Choice] {
        match self {
            QuestionBody::Single { choices, .. }
            | QuestionBody::SelectAll { choices, .. }
            | QuestionBody::OrderedSequence { choices, .. } => choices,
            QuestionBody::Grid { rows, .. } => rows,
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question record, as found in bank files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub topic_id: TopicId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub stem: String,
    #[serde(flatten)]
    pub body: QuestionBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Rationale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewLink>,
}

impl QuestionDraft {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        topic_id: impl Into<String>,
        stem: impl Into<String>,
        body: QuestionBody,
    ) -> Self {
        Self {
            id: QuestionId::new(id),
            topic_id: TopicId::new(topic_id),
            category: None,
            difficulty: Difficulty::default(),
            stem: stem.into(),
            body,
            rationale: None,
            tip: None,
            review: None,
        }
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: Rationale) -> Self {
        self.rationale = Some(rationale);
        self
    }

    #[must_use]
    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }

    #[must_use]
    pub fn with_review(mut self, section_id: impl Into<String>, title: impl Into<String>) -> Self {
        self.review = Some(ReviewLink {
            section_id: section_id.into(),
            title: title.into(),
        });
        self
    }

    /// Check the record's internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the key does not fit the choices.
    pub fn validate(self) -> Result<Question, QuestionError> {
        if self.id.as_str().trim().is_empty() {
            return Err(QuestionError::EmptyId);
        }
        let id = self.id.clone();
        if self.stem.trim().is_empty() {
            return Err(QuestionError::EmptyStem(id));
        }

        let choices = self.body.choices();
        if choices.is_empty() {
            return Err(QuestionError::NoChoices(id));
        }
        let mut known = HashSet::with_capacity(choices.len());
        for choice in choices {
            if !known.insert(&choice.id) {
                return Err(QuestionError::DuplicateChoice {
                    question: id,
                    choice: choice.id.clone(),
                });
            }
        }
        let unknown = |choice: &ChoiceId| QuestionError::UnknownKeyChoice {
            question: id.clone(),
            choice: choice.clone(),
        };

        match &self.body {
            QuestionBody::Single { key, .. } => {
                if !known.contains(key) {
                    return Err(unknown(key));
                }
            }
            QuestionBody::SelectAll { key, .. } => {
                if key.is_empty() {
                    return Err(QuestionError::EmptyKey(id));
                }
                if let Some(bad) = key.iter().find(|c| !known.contains(c)) {
                    return Err(unknown(bad));
                }
            }
            QuestionBody::OrderedSequence { key, .. } => {
                if let Some(bad) = key.iter().find(|c| !known.contains(c)) {
                    return Err(unknown(bad));
                }
                let distinct: HashSet<_> = key.iter().collect();
                if key.len() != choices.len() || distinct.len() != key.len() {
                    return Err(QuestionError::OrderedKeyNotPermutation(id));
                }
            }
            QuestionBody::Grid { rows, columns, key } => {
                if columns.is_empty() {
                    return Err(QuestionError::NoColumns(id));
                }
                if let Some(bad) = key.keys().find(|c| !known.contains(c)) {
                    return Err(unknown(bad));
                }
                for row in rows {
                    let Some(column) = key.get(&row.id) else {
                        return Err(QuestionError::UnkeyedRow {
                            question: id,
                            row: row.id.clone(),
                        });
                    };
                    if !columns.contains(column) {
                        return Err(QuestionError::UnknownColumn {
                            question: id,
                            row: row.id.clone(),
                            column: column.clone(),
                        });
                    }
                }
            }
        }

        Ok(Question { draft: self })
    }
}

/// A validated, immutable question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    draft: QuestionDraft,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(question: Question) -> Self {
        question.draft
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.draft.id
    }

    #[must_use]
    pub fn topic_id(&self) -> &TopicId {
        &self.draft.topic_id
    }

    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.draft.category.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.draft.difficulty
    }

    #[must_use]
    pub fn stem(&self) -> &str {
        &self.draft.stem
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.draft.body.kind()
    }

    #[must_use]
    pub fn body(&self) -> &QuestionBody {
        &self.draft.body
    }

    /// Answer options; for grids, the rows.
    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        self.draft.body.choices()
    }

    /// Grid column labels; empty for other kinds.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match &self.draft.body {
            QuestionBody::Grid { columns, .. } => columns,
            _ => &[],
        }
    }

    #[must_use]
    pub fn answer_key(&self) -> AnswerKey {
        match &self.draft.body {
            QuestionBody::Single { key, .. } => AnswerKey::Single(key.clone()),
            QuestionBody::SelectAll { key, .. } => AnswerKey::SelectAll(key.clone()),
            QuestionBody::OrderedSequence { key, .. } => AnswerKey::OrderedSequence(key.clone()),
            QuestionBody::Grid { key, .. } => AnswerKey::Grid(key.clone()),
        }
    }

    #[must_use]
    pub fn has_choice(&self, id: &ChoiceId) -> bool {
        self.choices().iter().any(|c| &c.id == id)
    }

    #[must_use]
    pub fn rationale(&self) -> Option<&Rationale> {
        self.draft.rationale.as_ref()
    }

    #[must_use]
    pub fn tip(&self) -> Option<&str> {
        self.draft.tip.as_deref()
    }

    #[must_use]
    pub fn review(&self) -> Option<&ReviewLink> {
        self.draft.review.as_ref()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Vec<Choice> {
        vec![Choice::new("a", "A"), Choice::new("b", "B"), Choice::new("c", "C")]
    }

    #[test]
    fn single_question_validates() {
        let q = QuestionDraft::new(
            "q1",
            "heart-failure",
            "Which finding?",
            QuestionBody::Single {
                choices: abc(),
                key: ChoiceId::new("b"),
            },
        )
        .validate()
        .unwrap();

        assert_eq!(q.kind(), QuestionKind::Single);
        assert_eq!(q.answer_key(), AnswerKey::Single(ChoiceId::new("b")));
        assert!(q.columns().is_empty());
    }

    #[test]
    fn key_must_reference_known_choice() {
        let err = QuestionDraft::new(
            "q1",
            "t",
            "stem",
            QuestionBody::Single {
                choices: abc(),
                key: ChoiceId::new("z"),
            },
        )
        .validate()
        .unwrap_err();

        assert!(matches!(err, QuestionError::UnknownKeyChoice { .. }));
    }

    #[test]
    fn ordered_key_must_be_permutation() {
        let err = QuestionDraft::new(
            "q1",
            "t",
            "stem",
            QuestionBody::OrderedSequence {
                choices: abc(),
                key: vec![ChoiceId::new("a"), ChoiceId::new("a"), ChoiceId::new("b")],
            },
        )
        .validate()
        .unwrap_err();

        assert!(matches!(err, QuestionError::OrderedKeyNotPermutation(_)));
    }

    #[test]
    fn grid_rows_must_all_be_keyed() {
        let mut key = BTreeMap::new();
        key.insert(ChoiceId::new("r1"), "Yes".to_owned());
        let err = QuestionDraft::new(
            "q1",
            "t",
            "stem",
            QuestionBody::Grid {
                rows: vec![Choice::new("r1", "Edema"), Choice::new("r2", "Crackles")],
                columns: vec!["Yes".into(), "No".into()],
                key,
            },
        )
        .validate()
        .unwrap_err();

        assert!(matches!(err, QuestionError::UnkeyedRow { .. }));
    }

    #[test]
    fn empty_select_all_key_is_rejected() {
        let err = QuestionDraft::new(
            "q1",
            "t",
            "stem",
            QuestionBody::SelectAll {
                choices: abc(),
                key: BTreeSet::new(),
            },
        )
        .validate()
        .unwrap_err();

        assert!(matches!(err, QuestionError::EmptyKey(_)));
    }

    #[test]
    fn deserializes_bank_record() {
        let json = r#"{
            "id": "cad-007",
            "topicId": "cad",
            "category": "cardiovascular",
            "difficulty": "analysis",
            "stem": "Order the steps.",
            "type": "ordered-sequence",
            "choices": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
            "key": ["b", "a"],
            "tip": "Airway first.",
            "review": {"sectionId": "nitro", "title": "Nitroglycerin"}
        }"#;

        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind(), QuestionKind::OrderedSequence);
        assert_eq!(q.difficulty(), Difficulty::Analysis);
        assert_eq!(q.category(), Some("cardiovascular"));
        assert_eq!(q.review().unwrap().section_id, "nitro");
    }

    #[test]
    fn deserialization_runs_validation() {
        let json = r#"{
            "id": "x", "topicId": "t", "stem": "s",
            "type": "single", "choices": [{"id": "a", "text": "A"}], "key": "q"
        }"#;

        assert!(serde_json::from_str::<Question>(json).is_err());
    }
}
