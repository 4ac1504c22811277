//! Interactive terminal loop over one live session.

use std::io::Write;

use quiz_core::model::{Confidence, Question, QuestionBody, QuizMode};
use services::session::{FullFeedback, SessionProgress, TimerMode};
use services::{
    AdvanceOutcome, Feedback, LiveSession, QuizService, SessionPhase, SessionSummary,
    SubmitResponse, Transition,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::input::{Command, parse_answer, parse_confidence};

pub type Input = Lines<BufReader<Stdin>>;

/// How the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    Completed(Box<SessionSummary>),
    /// Left with the session saved for later.
    Suspended,
    Abandoned,
}

pub async fn prompt(input: &mut Input, text: &str) -> std::io::Result<Option<String>> {
    print!("{text}");
    std::io::stdout().flush()?;
    input.next_line().await
}

/// Drive `live` until it completes or the user leaves.
///
/// # Errors
///
/// Returns an error only if the terminal cannot be read or written.
pub async fn run_session(
    quiz: &QuizService,
    live: &LiveSession,
    input: &mut Input,
) -> std::io::Result<Exit> {
    loop {
        let (phase, pending, question, progress, remaining) = {
            let session = live.lock().await;
            (
                session.phase(),
                session.pending_confidence().cloned(),
                session.current_question().cloned(),
                session.progress(),
                session
                    .timer()
                    .filter(|t| t.mode == TimerMode::Countdown)
                    .and_then(|t| t.remaining_seconds()),
            )
        };

        match phase {
            SessionPhase::Completed => {
                let summary = live.summary().await;
                return Ok(summary.map_or(Exit::Abandoned, |s| Exit::Completed(Box::new(s))));
            }
            SessionPhase::NotStarted => return Ok(Exit::Abandoned),
            SessionPhase::AwaitingFlagReview => {
                println!("\nYou flagged questions you have not answered yet.");
                let Some(line) = prompt(input, "[j]ump to first flagged, [f]inish: ").await? else {
                    return Ok(Exit::Suspended);
                };
                match line.trim() {
                    "j" => {
                        let _ = quiz.jump_to_flagged(live).await;
                    }
                    "f" => {
                        let _ = quiz.finish(live).await;
                    }
                    _ => {}
                }
            }
            SessionPhase::InProgress => {
                if pending.is_some() {
                    let Some(line) = prompt(input, "Confidence [l]ow / [m]edium / [h]igh: ").await?
                    else {
                        return Ok(Exit::Suspended);
                    };
                    let Some(level) = parse_confidence(&line) else {
                        continue;
                    };
                    if let Transition::Applied(Feedback::Full(feedback)) =
                        quiz.record_confidence(live, level).await
                    {
                        print_full_feedback(&feedback, level);
                        let _ = quiz.advance(live).await;
                    }
                    continue;
                }

                let Some(question) = question else {
                    return Ok(Exit::Abandoned);
                };
                print_question(&question, &progress, remaining);
                let Some(line) = prompt(input, "> ").await? else {
                    return Ok(Exit::Suspended);
                };

                match Command::parse(&line) {
                    Command::Help => print_help(),
                    Command::Quit => return Ok(Exit::Suspended),
                    Command::Abandon => {
                        let _ = quiz.abandon(live).await;
                        return Ok(Exit::Abandoned);
                    }
                    Command::Flag => {
                        if let Transition::Applied(flagged) = quiz.toggle_flag(live).await {
                            println!("{}", if flagged { "Flagged." } else { "Unflagged." });
                        }
                    }
                    Command::Skip => report_advance(quiz.advance(live).await),
                    Command::Answer(raw) => {
                        let answer = match parse_answer(&question, &raw) {
                            Ok(answer) => answer,
                            Err(err) => {
                                println!("{err}");
                                continue;
                            }
                        };
                        match quiz.submit(live, answer).await {
                            Transition::Applied(SubmitResponse::Incomplete(err)) => {
                                println!("Not yet: {err}");
                            }
                            Transition::Applied(SubmitResponse::Graded(Feedback::Verdict {
                                verdict,
                                ..
                            })) => {
                                println!("{verdict:?}");
                                report_advance(quiz.advance(live).await);
                            }
                            Transition::Applied(_) => {}
                            Transition::Ignored(reason) => println!("({reason})"),
                        }
                    }
                }
            }
        }
    }
}

fn report_advance(transition: Transition<AdvanceOutcome>) {
    if let Transition::Ignored(reason) = transition {
        println!("({reason})");
    }
}

fn print_help() {
    println!("Type your answer, or one of:");
    println!("  :f  flag / unflag this question");
    println!("  :n  skip to the next question");
    println!("  :q  quit and keep the session for later");
    println!("  :x  abandon the session");
}

fn print_question(question: &Question, progress: &SessionProgress, remaining: Option<u64>) {
    println!();
    match remaining {
        Some(secs) => println!(
            "Question {} / {}   {}:{:02} left",
            progress.position(),
            progress.total,
            secs / 60,
            secs % 60
        ),
        None => println!("Question {} / {}", progress.position(), progress.total),
    }
    println!("{}", question.stem());
    for choice in question.choices() {
        println!("  {}) {}", choice.id, choice.text);
    }
    match question.body() {
        QuestionBody::Single { .. } => println!("(pick one)"),
        QuestionBody::SelectAll { .. } => println!("(select all that apply)"),
        QuestionBody::OrderedSequence { .. } => println!("(list every id in order)"),
        QuestionBody::Grid { columns, .. } => {
            println!("(row=column for each row; columns: {})", columns.join(", "));
        }
    }
}

fn print_full_feedback(feedback: &FullFeedback, level: Confidence) {
    let outcome = &feedback.outcome;
    println!(
        "{:?} ({:.0}%), confidence {level}",
        outcome.verdict(),
        outcome.partial_score * 100.0
    );
    if let Some(rationale) = feedback.rationale.as_ref().and_then(|r| r.correct.as_ref()) {
        println!("Why: {rationale}");
    }
    if let Some(tip) = &feedback.tip {
        println!("Tip: {tip}");
    }
    if let Some(review) = &feedback.review {
        println!("Review: {}", review.title);
    }
}

pub fn print_summary(summary: &SessionSummary) {
    println!();
    if summary.timed_out {
        println!("Time is up.");
    }
    println!(
        "Score {:.0}%  ({} / {} correct, {}s)",
        summary.score * 100.0,
        summary.correct_count,
        summary.total,
        summary.elapsed_seconds
    );
    let h = summary.confidence_histogram;
    if summary.mode == QuizMode::Practice {
        println!("Confidence: low {}  medium {}  high {}", h.low, h.medium, h.high);
    }
    if !summary.weak_areas.is_empty() {
        println!("Review these sections:");
        for link in &summary.weak_areas {
            println!("  - {}", link.title);
        }
    }
}
