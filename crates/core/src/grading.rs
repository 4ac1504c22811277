//! Pure grading of one answer against one question.
//!
//! Nothing here holds state: the session machine calls [`grade`] once per
//! submission and stores the returned [`AnswerOutcome`].

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Answer, AnswerKey, AnswerOutcome, AnswerShapeError, ChoiceId, Question};

/// Grade `answer` against `question`'s key.
///
/// The answer must be complete for the question (see `Answer::check_shape`);
/// incomplete answers never get a verdict.
///
/// # Errors
///
/// Returns `AnswerShapeError` if the answer is the wrong kind, references
/// unknown choices, or is incomplete.
///
/// # Examples
///
/// ```
/// # use quiz_core::grading::grade;
/// # use quiz_core::model::{Answer, ChoiceId, Choice, QuestionBody, QuestionDraft};
/// let question = QuestionDraft::new(
///     "q1",
///     "copd",
///     "Which findings are expected?",
///     QuestionBody::SelectAll {
///         choices: vec![Choice::new("a", "A"), Choice::new("b", "B"), Choice::new("c", "C")],
///         key: [ChoiceId::new("a"), ChoiceId::new("b")].into_iter().collect(),
///     },
/// )
/// .validate()
/// .unwrap();
///
/// let outcome = grade(&question, &Answer::select_all(["a"])).unwrap();
/// assert!(!outcome.correct);
/// assert_eq!(outcome.partial_score, 0.5);
/// ```
pub fn grade(question: &Question, answer: &Answer) -> Result<AnswerOutcome, AnswerShapeError> {
    answer.check_shape(question)?;

    let key = question.answer_key();
    let (correct, partial_score) = match (&key, answer) {
        (AnswerKey::Single(key), Answer::Single(chosen)) => {
            let correct = key == chosen;
            (correct, if correct { 1.0 } else { 0.0 })
        }
        (AnswerKey::SelectAll(key), Answer::SelectAll(chosen)) => select_all_score(key, chosen),
        (AnswerKey::OrderedSequence(key), Answer::OrderedSequence(chosen)) => {
            sequence_score(key, chosen)
        }
        (AnswerKey::Grid(key), Answer::Grid(chosen)) => grid_score(key, chosen),
        _ => {
            return Err(AnswerShapeError::KindMismatch {
                expected: key.kind().as_str(),
                found: answer.kind().as_str(),
            });
        }
    };

    Ok(AnswerOutcome {
        kind: question.kind(),
        correct,
        partial_score,
        user_answer: Some(answer.clone()),
        correct_answer: key,
    })
}

/// `max(0, hits - wrong picks) / |key|`; an exact match is always full credit.
fn select_all_score(key: &BTreeSet<ChoiceId>, chosen: &BTreeSet<ChoiceId>) -> (bool, f64) {
    if key == chosen {
        return (true, 1.0);
    }
    if key.is_empty() {
        return (false, 0.0);
    }
    let hits = key.intersection(chosen).count();
    let wrong = chosen.difference(key).count();
    let net = hits.saturating_sub(wrong);
    (false, ratio(net, key.len()))
}

/// Position-aligned matches over the key length.
fn sequence_score(key: &[ChoiceId], chosen: &[ChoiceId]) -> (bool, f64) {
    if key == chosen {
        return (true, 1.0);
    }
    let aligned = key.iter().zip(chosen).filter(|(k, c)| k == c).count();
    (false, ratio(aligned, key.len()))
}

fn grid_score(key: &BTreeMap<ChoiceId, String>, chosen: &BTreeMap<ChoiceId, String>) -> (bool, f64) {
    let matching = key
        .iter()
        .filter(|(row, column)| chosen.get(*row) == Some(*column))
        .count();
    if matching == key.len() {
        return (true, 1.0);
    }
    (false, ratio(matching, key.len()))
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Choice, QuestionBody, QuestionDraft, QuestionKind, Verdict};

    const EPS: f64 = 1e-9;

    fn choices(ids: &[&str]) -> Vec<Choice> {
        ids.iter().map(|id| Choice::new(*id, id.to_uppercase())).collect()
    }

    fn ids(ids: &[&str]) -> Vec<ChoiceId> {
        ids.iter().map(|id| ChoiceId::new(*id)).collect()
    }

    fn single() -> Question {
        QuestionDraft::new(
            "s1",
            "t",
            "Pick one",
            QuestionBody::Single {
                choices: choices(&["a", "b", "c", "d"]),
                key: ChoiceId::new("b"),
            },
        )
        .validate()
        .unwrap()
    }

    fn select_all() -> Question {
        QuestionDraft::new(
            "sata",
            "t",
            "Select all",
            QuestionBody::SelectAll {
                choices: choices(&["a", "b", "c", "d", "e"]),
                key: ids(&["a", "b", "c"]).into_iter().collect(),
            },
        )
        .validate()
        .unwrap()
    }

    fn ordered() -> Question {
        QuestionDraft::new(
            "ord",
            "t",
            "Order",
            QuestionBody::OrderedSequence {
                choices: choices(&["a", "b", "c", "d", "e"]),
                key: ids(&["a", "b", "c", "d", "e"]),
            },
        )
        .validate()
        .unwrap()
    }

    fn grid() -> Question {
        let key = [("r1", "Yes"), ("r2", "No"), ("r3", "Yes"), ("r4", "No")]
            .into_iter()
            .map(|(r, c)| (ChoiceId::new(r), c.to_owned()))
            .collect();
        QuestionDraft::new(
            "grid",
            "t",
            "Grid",
            QuestionBody::Grid {
                rows: choices(&["r1", "r2", "r3", "r4"]),
                columns: vec!["Yes".into(), "No".into()],
                key,
            },
        )
        .validate()
        .unwrap()
    }

    #[test]
    fn single_is_all_or_nothing() {
        let q = single();
        let right = grade(&q, &Answer::single("b")).unwrap();
        assert!(right.correct);
        assert_eq!(right.partial_score, 1.0);

        for wrong in ["a", "c", "d"] {
            let outcome = grade(&q, &Answer::single(wrong)).unwrap();
            assert!(!outcome.correct);
            assert_eq!(outcome.partial_score, 0.0);
            assert_eq!(outcome.verdict(), Verdict::Incorrect);
        }
    }

    #[test]
    fn select_all_exact_match_is_correct() {
        let outcome = grade(&select_all(), &Answer::select_all(["c", "a", "b"])).unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.partial_score, 1.0);
    }

    #[test]
    fn select_all_subset_earns_partial_credit() {
        let outcome = grade(&select_all(), &Answer::select_all(["a", "b"])).unwrap();
        assert!(!outcome.correct);
        assert!((outcome.partial_score - 2.0 / 3.0).abs() < EPS);
        assert_eq!(outcome.verdict(), Verdict::Partial);
    }

    #[test]
    fn select_all_superset_is_penalised_per_wrong_pick() {
        let outcome = grade(&select_all(), &Answer::select_all(["a", "b", "c", "d"])).unwrap();
        assert!(!outcome.correct);
        assert!((outcome.partial_score - 2.0 / 3.0).abs() < EPS);

        let outcome =
            grade(&select_all(), &Answer::select_all(["a", "b", "c", "d", "e"])).unwrap();
        assert!((outcome.partial_score - 1.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn select_all_never_goes_negative() {
        let outcome = grade(&select_all(), &Answer::select_all(["a", "d", "e"])).unwrap();
        assert_eq!(outcome.partial_score, 0.0);

        let outcome = grade(&select_all(), &Answer::select_all(["d"])).unwrap();
        assert_eq!(outcome.partial_score, 0.0);
        assert_eq!(outcome.verdict(), Verdict::Incorrect);
    }

    #[test]
    fn ordered_counts_aligned_positions() {
        let q = ordered();
        let outcome = grade(&q, &Answer::ordered(["a", "d", "c", "e", "b"])).unwrap();
        assert!(!outcome.correct);
        assert!((outcome.partial_score - 0.4).abs() < EPS);
        assert_eq!(outcome.verdict(), Verdict::Partial);

        let exact = grade(&q, &Answer::ordered(["a", "b", "c", "d", "e"])).unwrap();
        assert!(exact.correct);
        assert_eq!(exact.partial_score, 1.0);
    }

    #[test]
    fn ordered_rotation_gets_no_credit() {
        let q = ordered();
        let rotated = grade(&q, &Answer::ordered(["b", "c", "d", "e", "a"])).unwrap();
        assert_eq!(rotated.partial_score, 0.0);

        let reversed = grade(&q, &Answer::ordered(["e", "d", "c", "b", "a"])).unwrap();
        // Only the middle element lines up.
        assert!((reversed.partial_score - 0.2).abs() < EPS);
    }

    #[test]
    fn grid_scores_rows() {
        let q = grid();
        let outcome = grade(
            &q,
            &Answer::grid([("r1", "Yes"), ("r2", "Yes"), ("r3", "Yes"), ("r4", "No")]),
        )
        .unwrap();
        assert!(!outcome.correct);
        assert!((outcome.partial_score - 0.75).abs() < EPS);

        let all = grade(
            &q,
            &Answer::grid([("r1", "Yes"), ("r2", "No"), ("r3", "Yes"), ("r4", "No")]),
        )
        .unwrap();
        assert!(all.correct);
        assert_eq!(all.kind, QuestionKind::Grid);
    }

    #[test]
    fn incomplete_answers_are_not_graded() {
        assert!(matches!(
            grade(&ordered(), &Answer::ordered(["a", "b"])),
            Err(AnswerShapeError::WrongLength { .. })
        ));
        assert!(matches!(
            grade(&grid(), &Answer::grid([("r1", "Yes")])),
            Err(AnswerShapeError::MissingRow(_))
        ));
        assert!(matches!(
            grade(&single(), &Answer::select_all(["a"])),
            Err(AnswerShapeError::KindMismatch { .. })
        ));
    }

    #[test]
    fn outcome_carries_both_answers() {
        let outcome = grade(&single(), &Answer::single("a")).unwrap();
        assert_eq!(outcome.user_answer, Some(Answer::single("a")));
        assert_eq!(outcome.correct_answer, AnswerKey::Single(ChoiceId::new("b")));
    }

    #[test]
    fn correct_implies_full_score_for_every_kind() {
        for q in [single(), select_all(), ordered(), grid()] {
            let outcome = grade(&q, &q.answer_key().to_answer()).unwrap();
            assert!(outcome.correct, "{}", q.id());
            assert_eq!(outcome.partial_score, 1.0);
            assert_eq!(outcome.credit(), 1.0);
        }
    }
}
