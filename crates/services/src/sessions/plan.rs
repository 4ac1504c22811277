use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use quiz_core::model::{Question, QuestionBank, QuestionFilter, QuestionId};

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub questions: Vec<Question>,
    pub reask_selected: usize,
    pub fresh_selected: usize,
}

impl SessionPlan {
    /// Total number of questions in this plan.
    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Returns true when no questions were selected for this session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Picks a quiz from the bank, putting questions due for re-asking first.
pub struct SessionBuilder<'a> {
    bank: &'a QuestionBank,
    filter: &'a QuestionFilter,
    size: Option<usize>,
    reask: HashSet<&'a QuestionId>,
}

impl<'a> SessionBuilder<'a> {
    #[must_use]
    pub fn new(bank: &'a QuestionBank, filter: &'a QuestionFilter) -> Self {
        Self {
            bank,
            filter,
            size: None,
            reask: HashSet::new(),
        }
    }

    /// Cap the quiz length. Without a cap every matching question is used.
    #[must_use]
    pub fn with_size(mut self, size: Option<usize>) -> Self {
        self.size = size;
        self
    }

    /// Questions the tracker wants asked again. Ids outside the filter are ignored.
    #[must_use]
    pub fn with_reask(mut self, ids: impl IntoIterator<Item = &'a QuestionId>) -> Self {
        self.reask = ids.into_iter().collect();
        self
    }

    /// Build the plan.
    ///
    /// - Matching questions split into re-ask and fresh pools.
    /// - Each pool is shuffled independently.
    /// - Re-ask questions come first, then fresh ones, truncated to `size`.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> SessionPlan {
        let (mut reask, mut fresh): (Vec<&Question>, Vec<&Question>) = self
            .bank
            .filtered(self.filter)
            .partition(|q| self.reask.contains(q.id()));

        reask.as_mut_slice().shuffle(rng);
        fresh.as_mut_slice().shuffle(rng);

        let cap = self.size.unwrap_or(usize::MAX);
        let reask_selected = reask.len().min(cap);
        let fresh_selected = fresh.len().min(cap - reask_selected);

        let questions = reask
            .into_iter()
            .take(reask_selected)
            .chain(fresh.into_iter().take(fresh_selected))
            .cloned()
            .collect();

        SessionPlan {
            questions,
            reask_selected,
            fresh_selected,
        }
    }
}

/// Shorthand for `SessionBuilder` when only the question list matters.
pub fn select_questions<'a, R: Rng + ?Sized>(
    bank: &'a QuestionBank,
    filter: &'a QuestionFilter,
    size: Option<usize>,
    reask: impl IntoIterator<Item = &'a QuestionId>,
    rng: &mut R,
) -> Vec<Question> {
    SessionBuilder::new(bank, filter)
        .with_size(size)
        .with_reask(reask)
        .build(rng)
        .questions
}
