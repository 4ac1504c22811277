use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use quiz_core::Clock;
use quiz_core::model::{
    Answer, Confidence, QuestionBank, QuestionFilter, QuestionId, QuizMode, QuizSettings,
    ReaskLevel, TopicId,
};
use storage::repository::{ReaskEntry, ReaskRepository, ReaskUpdate, Storage};

use super::persistence::{ResumeToken, SessionStore};
use super::plan::select_questions;
use super::progress::SessionProgress;
use super::service::{
    AdvanceOutcome, Feedback, QuizSession, SessionKind, SessionPhase, SessionSummary,
    SubmitResponse, TickOutcome, TimerMode, Transition,
};
use super::timer::{TimerHandle, spawn_ticker};
use crate::error::{PersistenceError, SessionError};
use crate::reporting::ReportSink;

const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

struct LiveInner {
    session: Mutex<QuizSession>,
    filter: QuestionFilter,
    size: Option<usize>,
    timer: StdMutex<Option<TimerHandle>>,
    report_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Shared handle to a running session.
///
/// Clones refer to the same session. The ticker only holds a weak reference,
/// so dropping every handle also stops the timer.
#[derive(Clone)]
pub struct LiveSession {
    inner: Arc<LiveInner>,
}

impl LiveSession {
    fn new(session: QuizSession, filter: QuestionFilter, size: Option<usize>) -> Self {
        Self {
            inner: Arc::new(LiveInner {
                session: Mutex::new(session),
                filter,
                size,
                timer: StdMutex::new(None),
                report_task: StdMutex::new(None),
            }),
        }
    }

    /// Lock the session for read access. Mutate through `QuizService`.
    pub async fn lock(&self) -> MutexGuard<'_, QuizSession> {
        self.inner.session.lock().await
    }

    pub async fn phase(&self) -> SessionPhase {
        self.lock().await.phase()
    }

    pub async fn progress(&self) -> SessionProgress {
        self.lock().await.progress()
    }

    pub async fn summary(&self) -> Option<SessionSummary> {
        self.lock().await.summary().cloned()
    }

    #[must_use]
    pub fn filter(&self) -> &QuestionFilter {
        &self.inner.filter
    }

    /// Wait for the completion report to be handed off. Returns immediately
    /// when no report is pending.
    pub async fn wait_for_report(&self) {
        let task = self
            .inner
            .report_task
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(error = %err, "report task failed");
        }
    }

    fn set_timer(&self, handle: TimerHandle) {
        if let Ok(mut slot) = self.inner.timer.lock() {
            *slot = Some(handle);
        }
    }

    fn stop_timer(&self) {
        let handle = self.inner.timer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    fn set_report_task(&self, task: JoinHandle<()>) {
        if let Ok(mut slot) = self.inner.report_task.lock() {
            *slot = Some(task);
        }
    }
}

/// Orchestrates quiz sessions: selection, state changes, saving, the timer,
/// the re-ask tracker, and reporting on completion.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    settings: QuizSettings,
    bank: Arc<QuestionBank>,
    reask: Arc<dyn ReaskRepository>,
    store: SessionStore,
    sink: Arc<dyn ReportSink>,
    tick_period: Option<Duration>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: QuizSettings,
        bank: Arc<QuestionBank>,
        storage: &Storage,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let store = SessionStore::new(storage.kv.clone(), clock, settings.resume_ttl());
        Self {
            clock,
            settings,
            bank,
            reask: storage.reask.clone(),
            store,
            sink,
            tick_period: Some(DEFAULT_TICK_PERIOD),
        }
    }

    /// Same service reading time from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.store = self.store.with_clock(clock);
        self
    }

    /// Period of the background timer; `None` leaves ticking to the caller.
    #[must_use]
    pub fn with_tick_period(mut self, period: Option<Duration>) -> Self {
        self.tick_period = period;
        self
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    #[must_use]
    pub fn settings(&self) -> &QuizSettings {
        &self.settings
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Select questions and start a new session.
    ///
    /// Questions the tracker holds for the filter's topic scope come first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if nothing matches the filter, or
    /// `SessionError::Storage` if the tracker cannot be read.
    pub async fn start(
        &self,
        filter: QuestionFilter,
        mode: QuizMode,
        size: Option<usize>,
    ) -> Result<LiveSession, SessionError> {
        let scope = filter.scope();
        let entries = self.reask.reask_entries(&scope).await?;
        let questions = select_questions(
            &self.bank,
            &filter,
            size,
            entries.keys(),
            &mut rand::rng(),
        );

        let mut session = QuizSession::new(scope, mode, SessionKind::Standard, &self.settings);
        if !session.start(questions, self.clock.now()).is_applied() {
            return Err(SessionError::Empty);
        }
        info!(
            topic = %session.topic_id(),
            mode = %mode,
            questions = session.questions().len(),
            reask = entries.len(),
            "quiz started"
        );
        self.store.save_or_warn(&session).await;

        let live = LiveSession::new(session, filter, size);
        self.start_timer(&live).await;
        Ok(live)
    }

    /// New session over the same filter and mode, with a fresh selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` unless `live` has completed.
    pub async fn retake(&self, live: &LiveSession) -> Result<LiveSession, SessionError> {
        let mode = {
            let session = live.lock().await;
            if session.phase() != SessionPhase::Completed {
                return Err(SessionError::NotCompleted);
            }
            session.mode()
        };
        self.start(live.filter().clone(), mode, live.inner.size).await
    }

    /// Untimed session over the questions `live` got wrong. It does not feed
    /// the tracker or reporting.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` unless `live` has completed, or
    /// `SessionError::NothingToReview` if every answer was correct.
    pub async fn review_missed(&self, live: &LiveSession) -> Result<LiveSession, SessionError> {
        let review = {
            let session = live.lock().await;
            let summary = session.summary().ok_or(SessionError::NotCompleted)?;
            let missed = summary.missed_ids();
            let questions: Vec<_> = session
                .questions()
                .iter()
                .filter(|q| missed.contains(q.id()))
                .cloned()
                .collect();

            let mut review = QuizSession::new(
                session.topic_id().clone(),
                session.mode(),
                SessionKind::Review,
                &self.settings,
            );
            if !review.start(questions, self.clock.now()).is_applied() {
                return Err(SessionError::NothingToReview);
            }
            review
        };
        info!(topic = %review.topic_id(), questions = review.questions().len(), "review started");
        self.store.save_or_warn(&review).await;
        Ok(LiveSession::new(
            review,
            live.filter().clone(),
            live.inner.size,
        ))
    }

    /// Resume the saved session for `topic`, if one exists and has not expired.
    ///
    /// A saved session that no longer decodes or references questions missing
    /// from the bank is discarded with a warning.
    ///
    /// An exam whose countdown ran out while nothing was running comes back
    /// already timed out and reported.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the store cannot be read.
    pub async fn resume(&self, topic: &TopicId) -> Result<Option<LiveSession>, SessionError> {
        let token = ResumeToken::new(topic.clone());
        let session = match self.store.load(&token, &self.bank).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(PersistenceError::Storage(err)) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, %topic, "discarding unreadable saved session");
                self.store.clear_or_warn(&token).await;
                return Ok(None);
            }
        };

        info!(%topic, answered = session.answers().len(), "quiz resumed");
        let filter = if *topic == TopicId::custom() {
            QuestionFilter::any()
        } else {
            QuestionFilter::for_topic(topic.clone())
        };
        let size = Some(session.questions().len());
        let expired = session.countdown_expired();
        let live = LiveSession::new(session, filter, size);
        if expired {
            // Ran out while the app was closed.
            let _ = self.apply(&live, QuizSession::timeout).await;
        } else {
            self.start_timer(&live).await;
        }
        Ok(Some(live))
    }

    /// Discard the session. Nothing is reported and the saved copy is removed.
    pub async fn abandon(&self, live: &LiveSession) -> Transition<()> {
        let transition = self.apply(live, |session, _| session.abandon()).await;
        if transition.is_applied() {
            live.stop_timer();
            info!("quiz abandoned");
        }
        transition
    }

    //
    // ─── EVENTS ────────────────────────────────────────────────────────────────
    //

    pub async fn submit(&self, live: &LiveSession, answer: Answer) -> Transition<SubmitResponse> {
        self.apply(live, |session, _| session.submit_answer(answer))
            .await
    }

    pub async fn record_confidence(
        &self,
        live: &LiveSession,
        level: Confidence,
    ) -> Transition<Feedback> {
        self.apply(live, |session, _| session.record_confidence(level))
            .await
    }

    pub async fn toggle_flag(&self, live: &LiveSession) -> Transition<bool> {
        self.apply(live, |session, _| session.toggle_flag()).await
    }

    pub async fn advance(&self, live: &LiveSession) -> Transition<AdvanceOutcome> {
        self.apply(live, QuizSession::advance).await
    }

    pub async fn jump_to_flagged(&self, live: &LiveSession) -> Transition<usize> {
        self.apply(live, |session, _| session.jump_to_flagged()).await
    }

    pub async fn finish(&self, live: &LiveSession) -> Transition<SessionSummary> {
        self.apply(live, QuizSession::finish).await
    }

    pub async fn tick(&self, live: &LiveSession) -> Transition<TickOutcome> {
        self.apply(live, QuizSession::tick).await
    }

    /// Apply one event, then save or finalize.
    async fn apply<T>(
        &self,
        live: &LiveSession,
        event: impl FnOnce(&mut QuizSession, chrono::DateTime<chrono::Utc>) -> Transition<T>,
    ) -> Transition<T> {
        let now = self.clock.now();
        let completed = {
            let mut session = live.lock().await;
            let transition = event(&mut session, now);
            if !transition.is_applied() {
                return transition;
            }
            if session.phase() == SessionPhase::Completed {
                (transition, session.summary().cloned())
            } else {
                self.store.save_or_warn(&session).await;
                (transition, None)
            }
        };

        let (transition, summary) = completed;
        if let Some(summary) = summary {
            self.finalize(live, summary).await;
        }
        transition
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    async fn finalize(&self, live: &LiveSession, summary: SessionSummary) {
        live.stop_timer();
        self.store
            .clear_or_warn(&ResumeToken::new(summary.topic_id.clone()))
            .await;

        info!(
            topic = %summary.topic_id,
            mode = %summary.mode,
            score = summary.score,
            correct = summary.correct_count,
            total = summary.total,
            timed_out = summary.timed_out,
            "quiz completed"
        );

        if summary.kind == SessionKind::Review {
            return;
        }

        if let Err(err) = self.update_tracker(&summary).await {
            warn!(error = %err, topic = %summary.topic_id, "failed to update re-ask tracker");
        }

        match summary.to_report() {
            Ok(report) => {
                let sink = self.sink.clone();
                let task = tokio::spawn(async move {
                    if let Err(err) = sink.deliver(&report).await {
                        warn!(error = %err, topic = %report.topic_id(), "report delivery failed");
                    }
                });
                live.set_report_task(task);
            }
            Err(err) => warn!(error = %err, "could not build session report"),
        }
    }

    /// Low and medium ratings schedule a re-ask; high clears it. Entries
    /// re-rated more than `reask_max_attempts` times are retired.
    async fn update_tracker(&self, summary: &SessionSummary) -> Result<(), SessionError> {
        let rated: Vec<(&QuestionId, Confidence)> = summary
            .results
            .iter()
            .filter_map(|r| r.confidence.map(|c| (&r.question_id, c)))
            .collect();
        if rated.is_empty() {
            return Ok(());
        }

        let existing = self.reask.reask_entries(&summary.topic_id).await?;
        let updates = tracker_updates(
            &existing,
            &rated,
            self.settings.reask_max_attempts(),
            summary.completed_at,
        );
        if !updates.is_empty() {
            self.reask
                .apply_reask_updates(&summary.topic_id, &updates)
                .await?;
        }
        Ok(())
    }

    //
    // ─── TIMER ─────────────────────────────────────────────────────────────────
    //

    async fn start_timer(&self, live: &LiveSession) {
        let Some(period) = self.tick_period else {
            return;
        };
        let timed = live
            .lock()
            .await
            .timer()
            .is_some_and(|t| t.mode != TimerMode::None);
        if !timed {
            return;
        }

        let service = self.clone();
        let weak: Weak<LiveInner> = Arc::downgrade(&live.inner);
        let handle = spawn_ticker(period, move || {
            let service = service.clone();
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let live = LiveSession { inner };
                match service.tick(&live).await {
                    Transition::Applied(TickOutcome::Running { .. }) => ControlFlow::Continue(()),
                    _ => ControlFlow::Break(()),
                }
            }
        });
        live.set_timer(handle);
    }
}

fn tracker_updates(
    existing: &BTreeMap<QuestionId, ReaskEntry>,
    rated: &[(&QuestionId, Confidence)],
    max_attempts: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<ReaskUpdate> {
    rated
        .iter()
        .filter_map(|(id, confidence)| match ReaskLevel::try_from(*confidence) {
            Ok(level) => {
                let attempts = existing.get(*id).map_or(0, |e| e.attempts) + 1;
                if attempts > max_attempts {
                    Some(ReaskUpdate::remove((*id).clone()))
                } else {
                    Some(ReaskUpdate::upsert(
                        (*id).clone(),
                        ReaskEntry::new(level, attempts, now),
                    ))
                }
            }
            Err(_) => existing
                .contains_key(*id)
                .then(|| ReaskUpdate::remove((*id).clone())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;
    use storage::repository::ReaskChange;

    #[test]
    fn tracker_updates_follow_confidence() {
        let q1 = QuestionId::new("q1");
        let q2 = QuestionId::new("q2");
        let q3 = QuestionId::new("q3");
        let q4 = QuestionId::new("q4");
        let mut existing = BTreeMap::new();
        existing.insert(q2.clone(), ReaskEntry::new(ReaskLevel::Low, 1, fixed_now()));
        existing.insert(q3.clone(), ReaskEntry::new(ReaskLevel::Medium, 3, fixed_now()));

        let rated = [
            (&q1, Confidence::Low),
            (&q2, Confidence::High),
            (&q3, Confidence::Medium),
            (&q4, Confidence::High),
        ];
        let updates = tracker_updates(&existing, &rated, 3, fixed_now());

        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[0],
            ReaskUpdate::upsert(q1, ReaskEntry::new(ReaskLevel::Low, 1, fixed_now()))
        );
        assert_eq!(updates[1].question_id, q2);
        assert_eq!(updates[1].change, ReaskChange::Remove);
        // Fourth re-rating retires the entry.
        assert_eq!(updates[2].question_id, q3);
        assert_eq!(updates[2].change, ReaskChange::Remove);
    }
}
