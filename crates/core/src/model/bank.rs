use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, TopicId};
use crate::model::question::{Difficulty, Question, QuestionDraft, QuestionError, QuestionKind};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BankError {
    #[error("question id {0} appears more than once")]
    DuplicateId(QuestionId),

    #[error("record #{index} is invalid: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: QuestionError,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

//
// ─── FILTER ────────────────────────────────────────────────────────────────────
//

/// Narrows the bank before selection. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuestionFilter {
    pub topics: Vec<TopicId>,
    pub categories: Vec<String>,
    pub difficulties: Vec<Difficulty>,
    pub kinds: Vec<QuestionKind>,
}

impl QuestionFilter {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_topic(topic: TopicId) -> Self {
        Self {
            topics: vec![topic],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_difficulties(mut self, difficulties: impl IntoIterator<Item = Difficulty>) -> Self {
        self.difficulties = difficulties.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = QuestionKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// The re-ask scope this filter selects from: its only topic, or the
    /// shared "custom" scope for mixed selections.
    #[must_use]
    pub fn scope(&self) -> TopicId {
        match self.topics.as_slice() {
            [topic] => topic.clone(),
            _ => TopicId::custom(),
        }
    }

    #[must_use]
    pub fn matches(&self, question: &Question) -> bool {
        (self.topics.is_empty() || self.topics.contains(question.topic_id()))
            && (self.categories.is_empty()
                || question
                    .category()
                    .is_some_and(|c| self.categories.iter().any(|want| want == c)))
            && (self.difficulties.is_empty() || self.difficulties.contains(&question.difficulty()))
            && (self.kinds.is_empty() || self.kinds.contains(&question.kind()))
    }
}

//
// ─── BANK ──────────────────────────────────────────────────────────────────────
//

#[derive(Deserialize)]
#[serde(untagged)]
enum BankFile {
    List(Vec<QuestionDraft>),
    Wrapped { questions: Vec<QuestionDraft> },
}

/// Immutable, validated collection of questions in file order.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
    by_id: HashMap<QuestionId, usize>,
}

impl QuestionBank {
    /// Builds a bank from validated questions.
    ///
    /// # Errors
    ///
    /// Returns `BankError::DuplicateId` if two questions share an id.
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        let mut by_id = HashMap::with_capacity(questions.len());
        for (pos, question) in questions.iter().enumerate() {
            if by_id.insert(question.id().clone(), pos).is_some() {
                return Err(BankError::DuplicateId(question.id().clone()));
            }
        }
        Ok(Self { questions, by_id })
    }

    /// Parses a bank file: either a JSON array of question records or an
    /// object with a `questions` array.
    ///
    /// # Errors
    ///
    /// Returns `BankError` if the JSON is malformed, a record fails
    /// validation, or ids repeat.
    pub fn from_json(json: &str) -> Result<Self, BankError> {
        let drafts = match serde_json::from_str::<BankFile>(json)? {
            BankFile::List(drafts) | BankFile::Wrapped { questions: drafts } => drafts,
        };
        let questions = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                draft
                    .validate()
                    .map_err(|source| BankError::InvalidRecord { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(questions)
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&Question> {
        self.by_id.get(id).map(|&pos| &self.questions[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn filtered<'a>(&'a self, filter: &'a QuestionFilter) -> impl Iterator<Item = &'a Question> {
        self.questions.iter().filter(move |q| filter.matches(q))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn topics(&self) -> BTreeSet<&TopicId> {
        self.questions.iter().map(Question::topic_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "questions": [
            {"id": "hf-1", "topicId": "heart-failure", "category": "cardio", "stem": "S1",
             "type": "single", "choices": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}], "key": "a"},
            {"id": "hf-2", "topicId": "heart-failure", "category": "cardio", "difficulty": "analysis",
             "stem": "S2", "type": "select-all",
             "choices": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}], "key": ["a", "b"]},
            {"id": "copd-1", "topicId": "copd", "stem": "S3",
             "type": "single", "choices": [{"id": "a", "text": "A"}], "key": "a"}
        ]
    }"#;

    #[test]
    fn loads_wrapped_bank() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        assert_eq!(bank.len(), 3);
        assert!(bank.get(&QuestionId::new("hf-2")).is_some());
        assert_eq!(bank.topics().len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let json = r#"[
            {"id": "x", "topicId": "t", "stem": "S", "type": "single",
             "choices": [{"id": "a", "text": "A"}], "key": "a"},
            {"id": "x", "topicId": "t", "stem": "S", "type": "single",
             "choices": [{"id": "a", "text": "A"}], "key": "a"}
        ]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, BankError::DuplicateId(id) if id.as_str() == "x"));
    }

    #[test]
    fn invalid_record_reports_position() {
        let json = r#"[
            {"id": "x", "topicId": "t", "stem": "S", "type": "single",
             "choices": [{"id": "a", "text": "A"}], "key": "a"},
            {"id": "y", "topicId": "t", "stem": "S", "type": "single",
             "choices": [{"id": "a", "text": "A"}], "key": "zz"}
        ]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, BankError::InvalidRecord { index: 1, .. }));
    }

    #[test]
    fn filter_combines_criteria() {
        let bank = QuestionBank::from_json(BANK).unwrap();

        let filter = QuestionFilter::for_topic(TopicId::new("heart-failure"))
            .with_difficulties([Difficulty::Analysis]);
        let ids: Vec<_> = bank.filtered(&filter).map(|q| q.id().as_str()).collect();
        assert_eq!(ids, ["hf-2"]);

        let filter = QuestionFilter::any().with_categories(["cardio"]);
        assert_eq!(bank.filtered(&filter).count(), 2);

        let filter = QuestionFilter::any().with_kinds([QuestionKind::Single]);
        assert_eq!(bank.filtered(&filter).count(), 2);
    }

    #[test]
    fn scope_falls_back_to_custom() {
        assert_eq!(
            QuestionFilter::for_topic(TopicId::new("copd")).scope(),
            TopicId::new("copd")
        );
        assert_eq!(QuestionFilter::any().scope(), TopicId::custom());
    }
}
