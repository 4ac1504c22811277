use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use quiz_core::Clock;
use quiz_core::model::{QuestionBank, TopicId};
use storage::repository::KeyValueStore;

use super::service::{QuizSession, SessionSnapshot};
use crate::error::{PersistenceError, SessionError};

const SNAPSHOT_VERSION: u32 = 1;
const KEY_PREFIX: &str = "quiz.session.";

/// Identifies the saved slot of a topic scope. One saved session per scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeToken(TopicId);

impl ResumeToken {
    #[must_use]
    pub fn new(topic: TopicId) -> Self {
        Self(topic)
    }

    #[must_use]
    pub fn topic(&self) -> &TopicId {
        &self.0
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{KEY_PREFIX}{}", self.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedSession {
    version: u32,
    saved_at: DateTime<Utc>,
    snapshot: SessionSnapshot,
}

/// Saves active sessions so they can be resumed after a restart.
///
/// Entries older than the TTL are treated as absent and removed on load.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Clock,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Clock, ttl: Duration) -> Self {
        Self { kv, clock, ttl }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Persist the session's current state and return the token to resume
    /// it with. Sessions that are not active clear their slot instead.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if encoding or the write fails.
    pub async fn save(&self, session: &QuizSession) -> Result<ResumeToken, PersistenceError> {
        let token = ResumeToken::new(session.topic_id().clone());
        let Some(snapshot) = session.snapshot() else {
            self.clear(&token).await?;
            return Ok(token);
        };
        let saved = SavedSession {
            version: SNAPSHOT_VERSION,
            saved_at: self.clock.now(),
            snapshot,
        };
        let json = serde_json::to_string(&saved)?;
        self.kv.set(&token.storage_key(), &json).await?;
        debug!(key = %token.storage_key(), "session saved");
        Ok(token)
    }

    /// Load and restore the saved session for `token`.
    ///
    /// Returns `Ok(None)` when nothing is saved or the entry has expired.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the entry cannot be decoded or no longer
    /// matches the bank. The entry is left in place.
    pub async fn load(
        &self,
        token: &ResumeToken,
        bank: &QuestionBank,
    ) -> Result<Option<QuizSession>, PersistenceError> {
        let key = token.storage_key();
        let Some(json) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let saved: SavedSession = serde_json::from_str(&json)?;
        if saved.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(saved.version));
        }

        let now = self.clock.now();
        if now - saved.saved_at > self.ttl {
            debug!(%key, saved_at = %saved.saved_at, "saved session expired");
            self.kv.remove(&key).await?;
            return Ok(None);
        }
        if saved.snapshot.topic_id != *token.topic() {
            return Err(PersistenceError::Restore(SessionError::CorruptSnapshot(
                "topic does not match slot".into(),
            )));
        }

        let session = QuizSession::restore(saved.snapshot, bank, now)?;
        Ok(Some(session))
    }

    /// # Errors
    ///
    /// Returns `PersistenceError` if the delete fails.
    pub async fn clear(&self, token: &ResumeToken) -> Result<(), PersistenceError> {
        self.kv.remove(&token.storage_key()).await?;
        Ok(())
    }

    /// Like `save`, but failures are logged and the session carries on.
    pub async fn save_or_warn(&self, session: &QuizSession) {
        if let Err(err) = self.save(session).await {
            warn!(error = %err, topic = %session.topic_id(), "failed to save session");
        }
    }

    /// Like `clear`, but failures are logged.
    pub async fn clear_or_warn(&self, token: &ResumeToken) {
        if let Err(err) = self.clear(token).await {
            warn!(error = %err, topic = %token.topic(), "failed to clear saved session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{
        Answer, Choice, ChoiceId, QuestionBody, QuestionDraft, QuizMode, QuizSettings,
    };
    use quiz_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    use crate::sessions::SessionKind;

    fn bank() -> QuestionBank {
        let questions = ["q1", "q2"]
            .into_iter()
            .map(|id| {
                QuestionDraft::new(
                    id,
                    "cardiac",
                    "Stem",
                    QuestionBody::Single {
                        choices: vec![Choice::new("a", "A"), Choice::new("b", "B")],
                        key: ChoiceId::new("a"),
                    },
                )
                .validate()
                .unwrap()
            })
            .collect();
        QuestionBank::new(questions).unwrap()
    }

    fn active_session(bank: &QuestionBank) -> QuizSession {
        let mut session = QuizSession::new(
            TopicId::new("cardiac"),
            QuizMode::Exam,
            SessionKind::Standard,
            &QuizSettings::default(),
        );
        let _ = session.start(bank.iter().cloned().collect(), fixed_now());
        let _ = session.submit_answer(Answer::single("a"));
        session
    }

    fn store(kv: &Arc<InMemoryRepository>, clock: Clock) -> SessionStore {
        let kv: Arc<dyn KeyValueStore> = kv.clone();
        SessionStore::new(kv, clock, Duration::hours(24))
    }

    #[tokio::test]
    async fn save_then_load_restores_answers() {
        let kv = Arc::new(InMemoryRepository::new());
        let bank = bank();
        let session = active_session(&bank);
        let token = store(&kv, fixed_clock()).save(&session).await.unwrap();
        assert_eq!(token, ResumeToken::new(TopicId::new("cardiac")));

        let later = Clock::fixed(fixed_now() + Duration::hours(2));
        let restored = store(&kv, later).load(&token, &bank).await.unwrap().unwrap();
        assert_eq!(restored.answers(), session.answers());
        assert_eq!(restored.timer().unwrap().elapsed_seconds, 7_200);
    }

    #[tokio::test]
    async fn expired_entry_is_dropped() {
        let kv = Arc::new(InMemoryRepository::new());
        let bank = bank();
        store(&kv, fixed_clock())
            .save(&active_session(&bank))
            .await
            .unwrap();

        let token = ResumeToken::new(TopicId::new("cardiac"));
        let late = Clock::fixed(fixed_now() + Duration::hours(25));
        assert!(store(&kv, late).load(&token, &bank).await.unwrap().is_none());
        assert_eq!(kv.get(&token.storage_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn completed_session_clears_slot() {
        let kv = Arc::new(InMemoryRepository::new());
        let bank = bank();
        let store = store(&kv, fixed_clock());
        let mut session = active_session(&bank);
        store.save(&session).await.unwrap();

        let _ = session.advance(fixed_now());
        let _ = session.advance(fixed_now());
        store.save(&session).await.unwrap();

        let token = ResumeToken::new(TopicId::new("cardiac"));
        assert!(store.load(&token, &bank).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_version_is_an_error() {
        let kv = Arc::new(InMemoryRepository::new());
        let token = ResumeToken::new(TopicId::new("cardiac"));
        let bank = bank();
        let store = store(&kv, fixed_clock());
        store.save(&active_session(&bank)).await.unwrap();

        let json = kv.get(&token.storage_key()).await.unwrap().unwrap();
        let bumped = json.replacen("\"version\":1", "\"version\":9", 1);
        kv.set(&token.storage_key(), &bumped).await.unwrap();

        let err = store.load(&token, &bank).await.err().unwrap();
        assert!(matches!(err, PersistenceError::UnsupportedVersion(9)));
    }
}
