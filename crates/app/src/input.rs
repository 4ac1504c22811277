//! Parsing of typed terminal input into session events.

use std::fmt;

use quiz_core::model::{Answer, Confidence, Question, QuestionKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Empty,
    UnknownChoice(String),
    MalformedCell(String),
    UnknownColumn(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Empty => write!(f, "no answer given"),
            InputError::UnknownChoice(raw) => write!(f, "no option {raw:?}"),
            InputError::MalformedCell(raw) => write!(f, "expected row=column, got {raw:?}"),
            InputError::UnknownColumn(raw) => write!(f, "no column {raw:?}"),
        }
    }
}

impl std::error::Error for InputError {}

/// One line typed while a question is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Answer(String),
    Flag,
    Skip,
    Quit,
    Abandon,
    Help,
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            ":f" | ":flag" => Self::Flag,
            ":n" | ":next" | ":skip" => Self::Skip,
            ":q" | ":quit" => Self::Quit,
            ":x" | ":abandon" => Self::Abandon,
            ":h" | ":help" | "?" => Self::Help,
            other => Self::Answer(other.to_owned()),
        }
    }
}

/// Turn typed text into an answer for `question`.
///
/// - single: `b`
/// - select-all: `a c d` or `a,c,d`
/// - ordered-sequence: ids in order, `c a b d`
/// - grid: `row=column` pairs, columns matched case-insensitively
///
/// Option ids are matched case-insensitively. Completeness is checked by the
/// session when the answer is submitted.
///
/// # Errors
///
/// Returns `InputError` if the text names options the question does not have.
pub fn parse_answer(question: &Question, raw: &str) -> Result<Answer, InputError> {
    let tokens: Vec<&str> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(InputError::Empty);
    }

    match question.kind() {
        QuestionKind::Single => Ok(Answer::single(resolve_choice(question, tokens[0])?)),
        QuestionKind::SelectAll => {
            let ids = tokens
                .iter()
                .map(|t| resolve_choice(question, t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Answer::select_all(ids))
        }
        QuestionKind::OrderedSequence => {
            let ids = tokens
                .iter()
                .map(|t| resolve_choice(question, t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Answer::ordered(ids))
        }
        QuestionKind::Grid => {
            let cells = tokens
                .iter()
                .map(|t| {
                    let (row, column) = t
                        .split_once('=')
                        .ok_or_else(|| InputError::MalformedCell((*t).to_owned()))?;
                    Ok((resolve_choice(question, row)?, resolve_column(question, column)?))
                })
                .collect::<Result<Vec<_>, InputError>>()?;
            Ok(Answer::grid(cells))
        }
    }
}

pub fn parse_confidence(raw: &str) -> Option<Confidence> {
    raw.parse().ok()
}

fn resolve_choice(question: &Question, raw: &str) -> Result<String, InputError> {
    question
        .choices()
        .iter()
        .find(|c| c.id.as_str().eq_ignore_ascii_case(raw))
        .map(|c| c.id.as_str().to_owned())
        .ok_or_else(|| InputError::UnknownChoice(raw.to_owned()))
}

fn resolve_column(question: &Question, raw: &str) -> Result<String, InputError> {
    question
        .columns()
        .iter()
        .find(|c| c.eq_ignore_ascii_case(raw))
        .cloned()
        .ok_or_else(|| InputError::UnknownColumn(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Choice, ChoiceId, QuestionBody, QuestionDraft};

    fn choices() -> Vec<Choice> {
        ["a", "b", "c"].iter().map(|id| Choice::new(*id, *id)).collect()
    }

    fn select_all() -> Question {
        QuestionDraft::new(
            "q",
            "t",
            "Stem",
            QuestionBody::SelectAll {
                choices: choices(),
                key: [ChoiceId::new("a")].into_iter().collect(),
            },
        )
        .validate()
        .unwrap()
    }

    fn grid() -> Question {
        QuestionDraft::new(
            "g",
            "t",
            "Stem",
            QuestionBody::Grid {
                rows: vec![Choice::new("r1", "Row 1"), Choice::new("r2", "Row 2")],
                columns: vec!["Indicated".into(), "Not indicated".into()],
                key: [
                    (ChoiceId::new("r1"), "Indicated".to_owned()),
                    (ChoiceId::new("r2"), "Indicated".to_owned()),
                ]
                .into_iter()
                .collect(),
            },
        )
        .validate()
        .unwrap()
    }

    #[test]
    fn commands_are_prefixed() {
        assert_eq!(Command::parse(" :f "), Command::Flag);
        assert_eq!(Command::parse(":quit"), Command::Quit);
        assert_eq!(Command::parse("b"), Command::Answer("b".into()));
    }

    #[test]
    fn select_all_accepts_commas_and_spaces() {
        let answer = parse_answer(&select_all(), "A, c").unwrap();
        assert_eq!(answer, Answer::select_all(["a", "c"]));
    }

    #[test]
    fn unknown_option_is_rejected() {
        assert_eq!(
            parse_answer(&select_all(), "a z"),
            Err(InputError::UnknownChoice("z".into()))
        );
        assert_eq!(parse_answer(&select_all(), "  "), Err(InputError::Empty));
    }

    #[test]
    fn grid_cells_match_columns_case_insensitively() {
        let answer = parse_answer(&grid(), "r1=indicated").unwrap();
        assert_eq!(answer, Answer::grid([("r1", "Indicated")]));
        assert_eq!(
            parse_answer(&grid(), "r1"),
            Err(InputError::MalformedCell("r1".into()))
        );
    }

    #[test]
    fn confidence_shortcuts() {
        assert_eq!(parse_confidence("h"), Some(Confidence::High));
        assert_eq!(parse_confidence("2"), Some(Confidence::Medium));
        assert_eq!(parse_confidence("sure"), None);
    }
}
