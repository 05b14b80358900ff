//! In-process store.
//!
//! All state sits behind one async mutex, which makes every operation
//! atomic with respect to the others. That gives `insert_pending_if_absent`
//! and `resolve_pending` the same guarantees the Postgres implementation
//! gets from `ON CONFLICT` and conditional `UPDATE`.

use super::{
    MessageRepository, ParticipantRepository, RecordingRepository, SessionRepository,
    SignalRepository,
};
use crate::errors::SessionError;
use crate::models::{
    ChatMessage, NewSession, ParticipantRecord, ParticipantStatus, ReactionEvent, Recording,
    Session, SignalDescriptor,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    /// Insertion sequence breaks ties between equal `created_at` values.
    participants: HashMap<(SessionId, UserId), (u64, ParticipantRecord)>,
    next_seq: u64,
    descriptors: HashMap<(SessionId, ConnectionId), SignalDescriptor>,
    chat: Vec<ChatMessage>,
    reactions: Vec<ReactionEvent>,
    recordings: Vec<Recording>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of participant records in `session`, any status.
    pub async fn participant_count(&self, session: &SessionId) -> usize {
        let inner = self.inner.lock().await;
        inner
            .participants
            .keys()
            .filter(|(s, _)| s == session)
            .count()
    }

    /// Reactions stored for `session`.
    pub async fn reactions(&self, session: &SessionId) -> Vec<ReactionEvent> {
        let inner = self.inner.lock().await;
        inner
            .reactions
            .iter()
            .filter(|r| &r.session_id == session)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&new.id) {
            return Err(SessionError::Conflict(format!(
                "Session {} already exists",
                new.id
            )));
        }
        let session = Session {
            id: new.id,
            host: new.host,
            passcode: new.passcode,
            scheduled_start: new.scheduled_start,
            created_at: Utc::now(),
        };
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.inner.lock().await.sessions.get(id).cloned())
    }
}

#[async_trait]
impl ParticipantRepository for MemoryStore {
    async fn insert_pending_if_absent(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let mut inner = self.inner.lock().await;
        let is_host = match inner.sessions.get(session) {
            Some(s) => s.is_host(user),
            None => return Err(SessionError::NotFound(format!("Session {session}"))),
        };
        if is_host {
            return Ok(None);
        }

        let key = (session.clone(), user.clone());
        if let Some((_, existing)) = inner.participants.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let record = ParticipantRecord {
            session_id: session.clone(),
            user_id: user.clone(),
            status: ParticipantStatus::Pending,
            created_at: Utc::now(),
        };
        inner.participants.insert(key, (seq, record.clone()));
        Ok(Some(record))
    }

    async fn get_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .participants
            .get(&(session.clone(), user.clone()))
            .map(|(_, r)| r.clone()))
    }

    async fn resolve_pending(
        &self,
        session: &SessionId,
        user: &UserId,
        status: ParticipantStatus,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let mut inner = self.inner.lock().await;
        match inner.participants.get_mut(&(session.clone(), user.clone())) {
            Some((_, record)) if record.status == ParticipantStatus::Pending => {
                record.status = status;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_by_status(
        &self,
        session: &SessionId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>, SessionError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&(u64, ParticipantRecord)> = inner
            .participants
            .values()
            .filter(|(_, r)| &r.session_id == session && r.status == status)
            .collect();
        rows.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn delete_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .participants
            .remove(&(session.clone(), user.clone()))
            .is_some())
    }
}

#[async_trait]
impl SignalRepository for MemoryStore {
    async fn register_descriptor(
        &self,
        descriptor: &SignalDescriptor,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        inner.descriptors.insert(
            (
                descriptor.session_id.clone(),
                descriptor.connection_id.clone(),
            ),
            descriptor.clone(),
        );
        Ok(())
    }

    async fn touch_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().await;
        match inner
            .descriptors
            .get_mut(&(session.clone(), connection.clone()))
        {
            Some(d) => {
                d.last_seen = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deregister_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        inner
            .descriptors
            .remove(&(session.clone(), connection.clone()));
        Ok(())
    }

    async fn list_live_descriptors(
        &self,
        session: &SessionId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalDescriptor>, SessionError> {
        let inner = self.inner.lock().await;
        let mut live: Vec<SignalDescriptor> = inner
            .descriptors
            .values()
            .filter(|d| &d.session_id == session && d.last_seen >= since)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        Ok(live)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn append_chat(&self, message: &ChatMessage) -> Result<(), SessionError> {
        self.inner.lock().await.chat.push(message.clone());
        Ok(())
    }

    async fn list_chat(&self, session: &SessionId) -> Result<Vec<ChatMessage>, SessionError> {
        let inner = self.inner.lock().await;
        let mut history: Vec<ChatMessage> = inner
            .chat
            .iter()
            .filter(|m| &m.session_id == session)
            .cloned()
            .collect();
        // Stable sort keeps append order for equal timestamps.
        history.sort_by_key(|m| m.sent_at);
        Ok(history)
    }

    async fn append_reaction(&self, reaction: &ReactionEvent) -> Result<(), SessionError> {
        self.inner.lock().await.reactions.push(reaction.clone());
        Ok(())
    }
}

#[async_trait]
impl RecordingRepository for MemoryStore {
    async fn insert_recording(&self, recording: &Recording) -> Result<(), SessionError> {
        self.inner.lock().await.recordings.push(recording.clone());
        Ok(())
    }

    async fn list_recordings(&self, session: &SessionId) -> Result<Vec<Recording>, SessionError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Recording> = inner
            .recordings
            .iter()
            .filter(|r| &r.session_id == session)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn store_with_session() -> (MemoryStore, SessionId) {
        let store = MemoryStore::new();
        let session = store
            .create_session(NewSession::new("room-1", "host"))
            .await
            .unwrap();
        (store, session.id)
    }

    #[tokio::test]
    async fn test_create_session_twice_conflicts() {
        let (store, _) = store_with_session().await;
        let err = store
            .create_session(NewSession::new("room-1", "someone"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_insert_pending_skips_host() {
        let (store, session) = store_with_session().await;
        let result = store
            .insert_pending_if_absent(&session, &UserId::from("host"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.participant_count(&session).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_insert_produces_one_record() {
        let (store, session) = store_with_session().await;
        let store = Arc::new(store);
        let user = UserId::from("guest");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let session = session.clone();
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                store.insert_pending_if_absent(&session, &user).await
            }));
        }
        for task in tasks {
            let record = task.await.unwrap().unwrap().unwrap();
            assert_eq!(record.status, ParticipantStatus::Pending);
        }

        assert_eq!(store.participant_count(&session).await, 1);
    }

    #[tokio::test]
    async fn test_resolve_pending_only_once() {
        let (store, session) = store_with_session().await;
        let user = UserId::from("guest");
        store.insert_pending_if_absent(&session, &user).await.unwrap();

        let first = store
            .resolve_pending(&session, &user, ParticipantStatus::Approved)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, ParticipantStatus::Approved);

        let second = store
            .resolve_pending(&session, &user, ParticipantStatus::Denied)
            .await
            .unwrap();
        assert!(second.is_none());

        let current = store.get_participant(&session, &user).await.unwrap();
        assert_eq!(current.unwrap().status, ParticipantStatus::Approved);
    }

    #[tokio::test]
    async fn test_list_by_status_is_insertion_ordered() {
        let (store, session) = store_with_session().await;
        for name in ["carol", "alice", "bob"] {
            store
                .insert_pending_if_absent(&session, &UserId::from(name))
                .await
                .unwrap();
        }

        let pending = store
            .list_by_status(&session, ParticipantStatus::Pending)
            .await
            .unwrap();
        let names: Vec<&str> = pending.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }

    #[tokio::test]
    async fn test_stale_descriptors_are_not_listed() {
        let (store, session) = store_with_session().await;
        let now = Utc::now();
        let fresh = SignalDescriptor {
            session_id: session.clone(),
            connection_id: ConnectionId::from("fresh"),
            user_id: UserId::from("a"),
            last_seen: now,
        };
        let stale = SignalDescriptor {
            session_id: session.clone(),
            connection_id: ConnectionId::from("stale"),
            user_id: UserId::from("b"),
            last_seen: now - chrono::Duration::seconds(120),
        };
        store.register_descriptor(&fresh).await.unwrap();
        store.register_descriptor(&stale).await.unwrap();

        let live = store
            .list_live_descriptors(&session, now - chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(live, vec![fresh]);

        assert!(store
            .touch_descriptor(&session, &ConnectionId::from("stale"), now)
            .await
            .unwrap());
        store
            .deregister_descriptor(&session, &ConnectionId::from("fresh"))
            .await
            .unwrap();
        assert!(!store
            .touch_descriptor(&session, &ConnectionId::from("fresh"), now)
            .await
            .unwrap());
    }
}
