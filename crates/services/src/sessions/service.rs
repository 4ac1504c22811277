use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

use quiz_core::grading::grade;
use quiz_core::model::{
    Answer, AnswerOutcome, AnswerShapeError, Confidence, ConfidenceHistogram, Question,
    QuestionBank, QuestionId, QuizMode, QuizSettings, Rationale, ReviewLink, SessionReport,
    SessionReportError, TopicId, Verdict,
};
use quiz_core::time::seconds_between;

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── PHASES & TIMER ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    InProgress,
    /// Last question passed with flagged questions still unanswered.
    AwaitingFlagReview,
    Completed,
}

impl SessionPhase {
    /// Whether caller events and timer ticks still apply.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress | Self::AwaitingFlagReview)
    }
}

/// Regular sessions feed the re-ask tracker and reporting; review sessions
/// over missed questions do neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Standard,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    None,
    Elapsed,
    Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimer {
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub mode: TimerMode,
    /// Countdown budget; `None` unless `mode` is `Countdown`.
    pub budget_seconds: Option<u64>,
}

impl SessionTimer {
    fn new(mode: TimerMode, budget_seconds: Option<u64>, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed_seconds: 0,
            mode,
            budget_seconds,
        }
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u64> {
        match (self.mode, self.budget_seconds) {
            (TimerMode::Countdown, Some(budget)) => Some(budget.saturating_sub(self.elapsed_seconds)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining_seconds() == Some(0)
    }

    /// Elapsed time is derived from the start timestamp and never moves back.
    fn catch_up(&mut self, now: DateTime<Utc>) {
        self.elapsed_seconds = self
            .elapsed_seconds
            .max(seconds_between(self.started_at, now));
    }
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Why an event left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    AlreadyStarted,
    NoQuestions,
    NotInProgress,
    AlreadyAnswered,
    AwaitingConfidence,
    NoPendingConfidence,
    NotAwaitingFlagReview,
    NoFlaggedQuestion,
    Untimed,
    TimeExpired,
    Completed,
}

impl fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyStarted => "session already started",
            Self::NoQuestions => "no questions to start with",
            Self::NotInProgress => "session is not in progress",
            Self::AlreadyAnswered => "question already answered",
            Self::AwaitingConfidence => "confidence rating required first",
            Self::NoPendingConfidence => "no answer awaiting a confidence rating",
            Self::NotAwaitingFlagReview => "session is not at flag review",
            Self::NoFlaggedQuestion => "no flagged question left unanswered",
            Self::Untimed => "session has no countdown",
            Self::TimeExpired => "countdown has run out",
            Self::Completed => "session already completed",
        };
        f.write_str(msg)
    }
}

/// Result of feeding one event to the state machine.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    Applied(T),
    Ignored(IgnoredReason),
}

impl<T> Transition<T> {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Ignored(_) => None,
        }
    }

    #[must_use]
    pub fn ignored_reason(&self) -> Option<IgnoredReason> {
        match self {
            Self::Applied(_) => None,
            Self::Ignored(reason) => Some(*reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        match self {
            Self::Applied(value) => Transition::Applied(f(value)),
            Self::Ignored(reason) => Transition::Ignored(reason),
        }
    }
}

//
// ─── EVENT PAYLOADS ────────────────────────────────────────────────────────────
//

/// Everything released once a practice answer has a confidence rating.
#[derive(Debug, Clone, PartialEq)]
pub struct FullFeedback {
    pub question_id: QuestionId,
    pub outcome: AnswerOutcome,
    pub confidence: Confidence,
    pub rationale: Option<Rationale>,
    pub tip: Option<String>,
    pub review: Option<ReviewLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Exam mode: correctness only.
    Verdict {
        question_id: QuestionId,
        verdict: Verdict,
    },
    /// Practice mode, after the confidence step.
    Full(Box<FullFeedback>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// Answer not yet submittable; nothing was recorded.
    Incomplete(AnswerShapeError),
    /// Practice mode: answer locked, verdict withheld until confidence arrives.
    ConfidenceRequested { question_id: QuestionId },
    Graded(Feedback),
}

impl SubmitResponse {
    /// Whether the answer was recorded.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Self::Incomplete(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Moved { index: usize },
    /// Caller chooses `jump_to_flagged` or `finish`.
    FlagReview { flagged_unanswered: Vec<QuestionId> },
    Completed(Box<SessionSummary>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Running {
        elapsed_seconds: u64,
        remaining_seconds: Option<u64>,
    },
    TimedOut(Box<SessionSummary>),
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub outcome: AnswerOutcome,
    pub confidence: Option<Confidence>,
    pub flagged: bool,
}

/// Local summary of a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub topic_id: TopicId,
    pub mode: QuizMode,
    pub kind: SessionKind,
    pub results: Vec<QuestionResult>,
    pub score: f64,
    pub correct_count: u32,
    pub total: u32,
    pub elapsed_seconds: u64,
    pub confidence_histogram: ConfidenceHistogram,
    /// Review sections of missed questions, first occurrence order.
    pub weak_areas: Vec<ReviewLink>,
    pub timed_out: bool,
    pub completed_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Questions that were not fully correct, in session order.
    #[must_use]
    pub fn missed_ids(&self) -> Vec<QuestionId> {
        self.results
            .iter()
            .filter(|r| !r.outcome.correct)
            .map(|r| r.question_id.clone())
            .collect()
    }

    /// # Errors
    ///
    /// Returns `SessionReportError` if the counts are inconsistent.
    pub fn to_report(&self) -> Result<SessionReport, SessionReportError> {
        SessionReport::from_persisted(
            self.topic_id.clone(),
            self.mode,
            self.score,
            self.correct_count,
            self.total,
            self.elapsed_seconds,
            self.confidence_histogram,
            self.completed_at,
        )
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Serializable state of an active session. Questions are stored by id and
/// resolved against the bank on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub topic_id: TopicId,
    pub mode: QuizMode,
    pub kind: SessionKind,
    pub phase: SessionPhase,
    pub question_ids: Vec<QuestionId>,
    pub index: usize,
    pub answers: BTreeMap<QuestionId, Answer>,
    pub results: BTreeMap<QuestionId, AnswerOutcome>,
    pub confidence: BTreeMap<QuestionId, Confidence>,
    pub flags: BTreeSet<QuestionId>,
    pub flags_surfaced: bool,
    pub pending_confidence: Option<QuestionId>,
    pub timer: SessionTimer,
    pub exam_seconds_per_question: u32,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One quiz attempt over a fixed, ordered question list.
///
/// Every event returns a `Transition`; events that do not fit the current
/// phase are ignored without changing state.
#[derive(Clone)]
pub struct QuizSession {
    topic_id: TopicId,
    mode: QuizMode,
    kind: SessionKind,
    exam_seconds_per_question: u32,
    phase: SessionPhase,
    questions: Vec<Question>,
    index: usize,
    answers: BTreeMap<QuestionId, Answer>,
    results: BTreeMap<QuestionId, AnswerOutcome>,
    confidence: BTreeMap<QuestionId, Confidence>,
    flags: BTreeSet<QuestionId>,
    flags_surfaced: bool,
    pending_confidence: Option<QuestionId>,
    timer: Option<SessionTimer>,
    summary: Option<SessionSummary>,
}

impl QuizSession {
    #[must_use]
    pub fn new(topic_id: TopicId, mode: QuizMode, kind: SessionKind, settings: &QuizSettings) -> Self {
        Self {
            topic_id,
            mode,
            kind,
            exam_seconds_per_question: settings.exam_seconds_per_question(),
            phase: SessionPhase::NotStarted,
            questions: Vec::new(),
            index: 0,
            answers: BTreeMap::new(),
            results: BTreeMap::new(),
            confidence: BTreeMap::new(),
            flags: BTreeSet::new(),
            flags_surfaced: false,
            pending_confidence: None,
            timer: None,
            summary: None,
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn topic_id(&self) -> &TopicId {
        &self.topic_id
    }

    #[must_use]
    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.phase.is_active() {
            self.questions.get(self.index)
        } else {
            None
        }
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn results(&self) -> &BTreeMap<QuestionId, AnswerOutcome> {
        &self.results
    }

    #[must_use]
    pub fn confidence(&self) -> &BTreeMap<QuestionId, Confidence> {
        &self.confidence
    }

    #[must_use]
    pub fn flags(&self) -> &BTreeSet<QuestionId> {
        &self.flags
    }

    #[must_use]
    pub fn is_flagged(&self, id: &QuestionId) -> bool {
        self.flags.contains(id)
    }

    #[must_use]
    pub fn pending_confidence(&self) -> Option<&QuestionId> {
        self.pending_confidence.as_ref()
    }

    #[must_use]
    pub fn timer(&self) -> Option<&SessionTimer> {
        self.timer.as_ref()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// An active countdown whose recorded elapsed time has used the budget.
    #[must_use]
    pub fn countdown_expired(&self) -> bool {
        self.phase.is_active()
            && self
                .timer
                .is_some_and(|t| t.mode == TimerMode::Countdown && t.is_expired())
    }

    fn countdown_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(mut timer) = self.timer else {
            return false;
        };
        timer.catch_up(now);
        self.phase.is_active() && timer.mode == TimerMode::Countdown && timer.is_expired()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.questions.len();
        let answered = self.answers.len();
        SessionProgress {
            total,
            answered,
            flagged: self.flags.len(),
            remaining: total.saturating_sub(answered),
            index: self.index,
            is_complete: self.phase == SessionPhase::Completed,
        }
    }

    fn flagged_unanswered(&self) -> Vec<QuestionId> {
        self.questions
            .iter()
            .map(Question::id)
            .filter(|id| self.flags.contains(*id) && !self.answers.contains_key(*id))
            .cloned()
            .collect()
    }

    //
    // ─── EVENTS ────────────────────────────────────────────────────────────────
    //

    /// Begin the attempt. Duplicate questions are dropped, keeping the first.
    pub fn start(&mut self, questions: Vec<Question>, now: DateTime<Utc>) -> Transition<()> {
        if self.phase != SessionPhase::NotStarted {
            return Transition::Ignored(IgnoredReason::AlreadyStarted);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        let questions: Vec<Question> = questions
            .into_iter()
            .filter(|q| seen.insert(q.id().clone()))
            .collect();
        if questions.is_empty() {
            return Transition::Ignored(IgnoredReason::NoQuestions);
        }

        let timer = match (self.kind, self.mode) {
            (SessionKind::Review, _) => SessionTimer::new(TimerMode::None, None, now),
            (SessionKind::Standard, QuizMode::Practice) => {
                SessionTimer::new(TimerMode::Elapsed, None, now)
            }
            (SessionKind::Standard, QuizMode::Exam) => {
                let count = u64::try_from(questions.len()).unwrap_or(u64::MAX);
                let budget = count.saturating_mul(u64::from(self.exam_seconds_per_question));
                SessionTimer::new(TimerMode::Countdown, Some(budget), now)
            }
        };

        self.questions = questions;
        self.index = 0;
        self.answers.clear();
        self.results.clear();
        self.confidence.clear();
        self.flags.clear();
        self.flags_surfaced = false;
        self.pending_confidence = None;
        self.summary = None;
        self.timer = Some(timer);
        self.phase = SessionPhase::InProgress;

        debug!(
            topic = %self.topic_id,
            mode = %self.mode,
            questions = self.questions.len(),
            timer = ?timer.mode,
            "session started"
        );
        Transition::Applied(())
    }

    /// Lock in an answer for the current question.
    pub fn submit_answer(&mut self, answer: Answer) -> Transition<SubmitResponse> {
        if self.phase != SessionPhase::InProgress {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        if self.countdown_expired() {
            return Transition::Ignored(IgnoredReason::TimeExpired);
        }
        if self.pending_confidence.is_some() {
            return Transition::Ignored(IgnoredReason::AwaitingConfidence);
        }
        let Some(question) = self.questions.get(self.index) else {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        };
        let question_id = question.id().clone();
        if self.answers.contains_key(&question_id) {
            return Transition::Ignored(IgnoredReason::AlreadyAnswered);
        }

        let outcome = match grade(question, &answer) {
            Ok(outcome) => outcome,
            Err(err) => return Transition::Applied(SubmitResponse::Incomplete(err)),
        };
        let verdict = outcome.verdict();

        self.answers.insert(question_id.clone(), answer);
        self.results.insert(question_id.clone(), outcome);
        debug!(question = %question_id, ?verdict, "answer recorded");

        match self.mode {
            QuizMode::Practice => {
                self.pending_confidence = Some(question_id.clone());
                Transition::Applied(SubmitResponse::ConfidenceRequested { question_id })
            }
            QuizMode::Exam => Transition::Applied(SubmitResponse::Graded(Feedback::Verdict {
                question_id,
                verdict,
            })),
        }
    }

    /// Second step of a practice submission; releases full feedback.
    pub fn record_confidence(&mut self, level: Confidence) -> Transition<Feedback> {
        if self.phase != SessionPhase::InProgress {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        let Some(question_id) = self.pending_confidence.as_ref() else {
            return Transition::Ignored(IgnoredReason::NoPendingConfidence);
        };
        let (Some(question), Some(outcome)) = (
            self.questions.iter().find(|q| q.id() == question_id),
            self.results.get(question_id),
        ) else {
            return Transition::Ignored(IgnoredReason::NoPendingConfidence);
        };

        let question_id = question_id.clone();
        let feedback = FullFeedback {
            question_id: question_id.clone(),
            outcome: outcome.clone(),
            confidence: level,
            rationale: question.rationale().cloned(),
            tip: question.tip().map(str::to_owned),
            review: question.review().cloned(),
        };
        self.pending_confidence = None;
        self.confidence.insert(question_id, level);
        Transition::Applied(Feedback::Full(Box::new(feedback)))
    }

    /// Flip the flag on the current question. Returns the new state.
    pub fn toggle_flag(&mut self) -> Transition<bool> {
        if !self.phase.is_active() {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        let Some(question) = self.questions.get(self.index) else {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        };
        let id = question.id().clone();
        let flagged = if self.flags.remove(&id) {
            false
        } else {
            self.flags.insert(id);
            true
        };
        Transition::Applied(flagged)
    }

    /// Move to the next question, or past the last one.
    ///
    /// Once the countdown has run out this times the session out instead.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Transition<AdvanceOutcome> {
        if self.phase != SessionPhase::InProgress {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        if self.countdown_expired_at(now) {
            return self
                .timeout(now)
                .map(|summary| AdvanceOutcome::Completed(Box::new(summary)));
        }
        if self.pending_confidence.is_some() {
            return Transition::Ignored(IgnoredReason::AwaitingConfidence);
        }

        if self.index + 1 < self.questions.len() {
            self.index += 1;
            return Transition::Applied(AdvanceOutcome::Moved { index: self.index });
        }

        if !self.flags_surfaced {
            let flagged_unanswered = self.flagged_unanswered();
            if !flagged_unanswered.is_empty() {
                self.phase = SessionPhase::AwaitingFlagReview;
                debug!(flagged = flagged_unanswered.len(), "awaiting flag review");
                return Transition::Applied(AdvanceOutcome::FlagReview { flagged_unanswered });
            }
        }

        let summary = self.complete(now, false);
        Transition::Applied(AdvanceOutcome::Completed(Box::new(summary)))
    }

    /// From flag review, go back to the first flagged question without an answer.
    pub fn jump_to_flagged(&mut self) -> Transition<usize> {
        if self.phase != SessionPhase::AwaitingFlagReview {
            return Transition::Ignored(IgnoredReason::NotAwaitingFlagReview);
        }
        if self.countdown_expired() {
            return Transition::Ignored(IgnoredReason::TimeExpired);
        }
        let target = self
            .questions
            .iter()
            .position(|q| self.flags.contains(q.id()) && !self.answers.contains_key(q.id()));
        let Some(index) = target else {
            return Transition::Ignored(IgnoredReason::NoFlaggedQuestion);
        };

        self.index = index;
        self.flags_surfaced = true;
        self.phase = SessionPhase::InProgress;
        Transition::Applied(index)
    }

    /// From flag review, proceed to completion.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Transition<SessionSummary> {
        if self.phase != SessionPhase::AwaitingFlagReview {
            return Transition::Ignored(IgnoredReason::NotAwaitingFlagReview);
        }
        if self.countdown_expired_at(now) {
            return self.timeout(now);
        }
        Transition::Applied(self.complete(now, false))
    }

    /// Periodic timer callback. A late tick after the session ended is ignored.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Transition<TickOutcome> {
        if !self.phase.is_active() {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        let Some(timer) = self.timer.as_mut() else {
            return Transition::Ignored(IgnoredReason::Untimed);
        };
        if timer.mode == TimerMode::None {
            return Transition::Ignored(IgnoredReason::Untimed);
        }

        timer.catch_up(now);
        if timer.is_expired() {
            return self
                .timeout(now)
                .map(|summary| TickOutcome::TimedOut(Box::new(summary)));
        }

        Transition::Applied(TickOutcome::Running {
            elapsed_seconds: timer.elapsed_seconds,
            remaining_seconds: timer.remaining_seconds(),
        })
    }

    /// Countdown exhausted: grade every unanswered question as incorrect and
    /// complete without flag review.
    pub fn timeout(&mut self, now: DateTime<Utc>) -> Transition<SessionSummary> {
        if !self.phase.is_active() {
            return Transition::Ignored(IgnoredReason::NotInProgress);
        }
        let Some(timer) = self.timer.as_mut() else {
            return Transition::Ignored(IgnoredReason::Untimed);
        };
        if timer.mode != TimerMode::Countdown {
            return Transition::Ignored(IgnoredReason::Untimed);
        }

        timer.catch_up(now);
        if let Some(budget) = timer.budget_seconds {
            timer.elapsed_seconds = timer.elapsed_seconds.min(budget);
        }
        debug!(topic = %self.topic_id, "countdown expired");
        Transition::Applied(self.complete(now, true))
    }

    /// Discard the attempt. Nothing is reported.
    pub fn abandon(&mut self) -> Transition<()> {
        if self.phase == SessionPhase::Completed {
            return Transition::Ignored(IgnoredReason::Completed);
        }

        self.phase = SessionPhase::NotStarted;
        self.questions.clear();
        self.index = 0;
        self.answers.clear();
        self.results.clear();
        self.confidence.clear();
        self.flags.clear();
        self.flags_surfaced = false;
        self.pending_confidence = None;
        self.timer = None;
        self.summary = None;
        debug!(topic = %self.topic_id, "session abandoned");
        Transition::Applied(())
    }

    fn complete(&mut self, now: DateTime<Utc>, timed_out: bool) -> SessionSummary {
        let timer_mode = self.timer.map(|t| t.mode);
        if let Some(timer) = self.timer.as_mut()
            && !timed_out
        {
            timer.catch_up(now);
        }

        for question in &self.questions {
            self.results
                .entry(question.id().clone())
                .or_insert_with(|| AnswerOutcome::unanswered(question));
        }
        self.pending_confidence = None;
        self.phase = SessionPhase::Completed;

        let summary = self.build_summary(now, timed_out);
        debug!(
            topic = %self.topic_id,
            score = summary.score,
            timed_out,
            timer = ?timer_mode,
            "session completed"
        );
        self.summary = Some(summary.clone());
        summary
    }

    fn build_summary(&self, completed_at: DateTime<Utc>, timed_out: bool) -> SessionSummary {
        let mut results = Vec::with_capacity(self.questions.len());
        let mut weak_areas: Vec<ReviewLink> = Vec::new();
        let mut credit = 0.0;
        let mut correct_count: u32 = 0;

        for question in &self.questions {
            let id = question.id();
            let outcome = self
                .results
                .get(id)
                .cloned()
                .unwrap_or_else(|| AnswerOutcome::unanswered(question));
            credit += outcome.credit();
            if outcome.correct {
                correct_count += 1;
            } else if let Some(link) = question.review()
                && !weak_areas.contains(link)
            {
                weak_areas.push(link.clone());
            }
            results.push(QuestionResult {
                question_id: id.clone(),
                outcome,
                confidence: self.confidence.get(id).copied(),
                flagged: self.flags.contains(id),
            });
        }

        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let score = if total == 0 {
            0.0
        } else {
            (credit / f64::from(total)).clamp(0.0, 1.0)
        };

        SessionSummary {
            topic_id: self.topic_id.clone(),
            mode: self.mode,
            kind: self.kind,
            results,
            score,
            correct_count,
            total,
            elapsed_seconds: self.timer.map_or(0, |t| t.elapsed_seconds),
            confidence_histogram: ConfidenceHistogram::from_ratings(self.confidence.values()),
            weak_areas,
            timed_out,
            completed_at,
        }
    }

    //
    // ─── SNAPSHOT / RESTORE ────────────────────────────────────────────────────
    //

    /// Capture an active session. Returns `None` outside the active phases.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        if !self.phase.is_active() {
            return None;
        }
        Some(SessionSnapshot {
            topic_id: self.topic_id.clone(),
            mode: self.mode,
            kind: self.kind,
            phase: self.phase,
            question_ids: self.questions.iter().map(|q| q.id().clone()).collect(),
            index: self.index,
            answers: self.answers.clone(),
            results: self.results.clone(),
            confidence: self.confidence.clone(),
            flags: self.flags.clone(),
            flags_surfaced: self.flags_surfaced,
            pending_confidence: self.pending_confidence.clone(),
            timer: self.timer?,
            exam_seconds_per_question: self.exam_seconds_per_question,
        })
    }

    /// Rebuild a session from a snapshot, continuing the timer from its
    /// original start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` if the bank no longer has a
    /// question, or `SessionError::CorruptSnapshot` if the maps disagree.
    pub fn restore(
        snapshot: SessionSnapshot,
        bank: &QuestionBank,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let corrupt = |what: &str| SessionError::CorruptSnapshot(what.to_owned());

        if !snapshot.phase.is_active() {
            return Err(corrupt("phase is not active"));
        }
        if snapshot.question_ids.is_empty() {
            return Err(corrupt("no questions"));
        }
        if snapshot.index >= snapshot.question_ids.len() {
            return Err(corrupt("index out of range"));
        }

        let mut questions = Vec::with_capacity(snapshot.question_ids.len());
        let mut ids = HashSet::with_capacity(snapshot.question_ids.len());
        for id in &snapshot.question_ids {
            if !ids.insert(id) {
                return Err(corrupt("duplicate question"));
            }
            let question = bank
                .get(id)
                .ok_or_else(|| SessionError::UnknownQuestion(id.clone()))?;
            questions.push(question.clone());
        }

        let unknown = snapshot
            .answers
            .keys()
            .chain(snapshot.confidence.keys())
            .chain(snapshot.flags.iter())
            .any(|id| !ids.contains(id));
        if unknown {
            return Err(corrupt("unknown question in answers"));
        }
        if !snapshot.answers.keys().eq(snapshot.results.keys()) {
            return Err(corrupt("answers and results differ"));
        }
        if snapshot
            .confidence
            .keys()
            .any(|id| !snapshot.results.contains_key(id))
        {
            return Err(corrupt("confidence without result"));
        }
        if let Some(pending) = &snapshot.pending_confidence
            && (!snapshot.results.contains_key(pending) || snapshot.confidence.contains_key(pending))
        {
            return Err(corrupt("pending confidence"));
        }

        let mut timer = snapshot.timer;
        timer.catch_up(now);

        Ok(Self {
            topic_id: snapshot.topic_id,
            mode: snapshot.mode,
            kind: snapshot.kind,
            exam_seconds_per_question: snapshot.exam_seconds_per_question,
            phase: snapshot.phase,
            questions,
            index: snapshot.index,
            answers: snapshot.answers,
            results: snapshot.results,
            confidence: snapshot.confidence,
            flags: snapshot.flags,
            flags_surfaced: snapshot.flags_surfaced,
            pending_confidence: snapshot.pending_confidence,
            timer: Some(timer),
            summary: None,
        })
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("topic_id", &self.topic_id)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("questions_len", &self.questions.len())
            .field("index", &self.index)
            .field("answered", &self.answers.len())
            .field("flags", &self.flags.len())
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
