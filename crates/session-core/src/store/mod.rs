//! Relational store interface.
//!
//! The core never talks to a database directly. Each concern is a narrow
//! async trait; [`Store`] bundles them so callers can hold a single
//! `Arc<dyn Store>`. [`MemoryStore`] backs tests and single-process use;
//! the service crate provides a Postgres implementation.

mod memory;

pub use memory::MemoryStore;

use crate::errors::SessionError;
use crate::models::{
    ChatMessage, NewSession, ParticipantRecord, ParticipantStatus, ReactionEvent, Recording,
    Session, SignalDescriptor,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, new: NewSession) -> Result<Session, SessionError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;
}

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Insert a `pending` record unless one already exists for the pair, or
    /// the user is the session host. Must be atomic: concurrent callers for
    /// the same pair observe exactly one row.
    ///
    /// Returns the record now stored, or `None` when the user is the host.
    async fn insert_pending_if_absent(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError>;

    async fn get_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError>;

    /// Move a `pending` record to `status`. Returns the updated record, or
    /// `None` if the record was not pending (or absent).
    async fn resolve_pending(
        &self,
        session: &SessionId,
        user: &UserId,
        status: ParticipantStatus,
    ) -> Result<Option<ParticipantRecord>, SessionError>;

    /// Records with `status`, oldest first.
    async fn list_by_status(
        &self,
        session: &SessionId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>, SessionError>;

    /// Returns whether a record was removed.
    async fn delete_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<bool, SessionError>;
}

#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Register (or refresh) a descriptor. One row per connection id.
    async fn register_descriptor(&self, descriptor: &SignalDescriptor)
        -> Result<(), SessionError>;

    /// Refresh `last_seen`. Returns false if the descriptor is gone.
    async fn touch_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<bool, SessionError>;

    async fn deregister_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
    ) -> Result<(), SessionError>;

    /// Descriptors seen at or after `since`.
    async fn list_live_descriptors(
        &self,
        session: &SessionId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalDescriptor>, SessionError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append_chat(&self, message: &ChatMessage) -> Result<(), SessionError>;

    /// Chat history, oldest first.
    async fn list_chat(&self, session: &SessionId) -> Result<Vec<ChatMessage>, SessionError>;

    async fn append_reaction(&self, reaction: &ReactionEvent) -> Result<(), SessionError>;
}

#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn insert_recording(&self, recording: &Recording) -> Result<(), SessionError>;

    /// Recordings for a session, newest first.
    async fn list_recordings(&self, session: &SessionId) -> Result<Vec<Recording>, SessionError>;
}

/// Everything the coordination layer needs from persistence.
pub trait Store:
    SessionRepository
    + ParticipantRepository
    + SignalRepository
    + MessageRepository
    + RecordingRepository
{
}

impl<T> Store for T where
    T: SessionRepository
        + ParticipantRepository
        + SignalRepository
        + MessageRepository
        + RecordingRepository
{
}
