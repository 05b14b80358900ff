//! Durable records shared by the registry, the bus and the stores.

use crate::errors::SessionError;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{ConnectionId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest accepted chat message, in characters.
pub const MAX_CHAT_CHARS: usize = 2000;

/// Longest accepted reaction symbol, in characters.
pub const MAX_REACTION_CHARS: usize = 16;

/// A meeting room. The host is fixed at creation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub host: UserId,
    pub passcode: Option<SecretString>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_host(&self, user: &UserId) -> bool {
        &self.host == user
    }
}

/// Input for creating a session through the store.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub host: UserId,
    pub passcode: Option<SecretString>,
    pub scheduled_start: Option<DateTime<Utc>>,
}

impl NewSession {
    pub fn new(id: impl Into<SessionId>, host: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            passcode: None,
            scheduled_start: None,
        }
    }

    #[must_use]
    pub fn with_passcode(mut self, passcode: &str) -> Self {
        self.passcode = Some(SecretString::from(passcode));
        self
    }

    #[must_use]
    pub fn scheduled_at(mut self, start: DateTime<Utc>) -> Self {
        self.scheduled_start = Some(start);
        self
    }
}

/// Admission state of a non-host user.
///
/// Transitions are monotonic: `Pending` may become `Approved` or `Denied`,
/// both of which are terminal for the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Approved,
    Denied,
}

impl ParticipantStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Approved => "approved",
            ParticipantStatus::Denied => "denied",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParticipantStatus::Pending)
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "approved" => Ok(ParticipantStatus::Approved),
            "denied" => Ok(ParticipantStatus::Denied),
            other => Err(SessionError::Store(format!(
                "unknown participant status '{other}'"
            ))),
        }
    }
}

/// Host decision on a pending participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Denied,
}

impl From<Verdict> for ParticipantStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Approved => ParticipantStatus::Approved,
            Verdict::Denied => ParticipantStatus::Denied,
        }
    }
}

/// One row per (session, user) that ever asked to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
}

/// Discovery entry for one live client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub session_id: SessionId,
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: SessionId,
    pub sender: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a validated chat message stamped now.
    pub fn compose(
        session_id: SessionId,
        sender: UserId,
        text: &str,
    ) -> Result<Self, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::BadRequest("Message is empty".to_string()));
        }
        if text.chars().count() > MAX_CHAT_CHARS {
            return Err(SessionError::BadRequest(format!(
                "Message exceeds {MAX_CHAT_CHARS} characters"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            text: text.to_string(),
            sent_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub id: Uuid,
    pub session_id: SessionId,
    pub sender: UserId,
    pub symbol: String,
    pub sent_at: DateTime<Utc>,
}

impl ReactionEvent {
    /// Build a validated reaction stamped now.
    pub fn compose(
        session_id: SessionId,
        sender: UserId,
        symbol: &str,
    ) -> Result<Self, SessionError> {
        let count = symbol.chars().count();
        if count == 0 || count > MAX_REACTION_CHARS {
            return Err(SessionError::BadRequest("Invalid reaction".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            symbol: symbol.to_string(),
            sent_at: Utc::now(),
        })
    }
}

/// Metadata for one uploaded recording artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub session_id: SessionId,
    pub uploader: UserId,
    pub filename: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ParticipantStatus::Pending,
            ParticipantStatus::Approved,
            ParticipantStatus::Denied,
        ] {
            assert_eq!(status.as_str().parse::<ParticipantStatus>().unwrap(), status);
        }
        assert!("banned".parse::<ParticipantStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!ParticipantStatus::Pending.is_terminal());
        assert!(ParticipantStatus::Approved.is_terminal());
        assert!(ParticipantStatus::Denied.is_terminal());
    }

    #[test]
    fn test_verdict_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Verdict::Approved).unwrap(),
            "\"approved\""
        );
        let v: Verdict = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(ParticipantStatus::from(v), ParticipantStatus::Denied);
    }

    #[test]
    fn test_chat_rejects_blank_and_oversized_text() {
        let session = SessionId::from("s");
        let user = UserId::from("u");
        assert!(ChatMessage::compose(session.clone(), user.clone(), "   ").is_err());
        let long = "x".repeat(MAX_CHAT_CHARS + 1);
        assert!(ChatMessage::compose(session.clone(), user.clone(), &long).is_err());

        let msg = ChatMessage::compose(session, user, "  hello ").unwrap();
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_reaction_symbol_bounds() {
        let session = SessionId::from("s");
        let user = UserId::from("u");
        assert!(ReactionEvent::compose(session.clone(), user.clone(), "").is_err());
        assert!(ReactionEvent::compose(session, user, "👍").is_ok());
    }

    #[test]
    fn test_session_host_check() {
        let session = Session {
            id: SessionId::from("s"),
            host: UserId::from("host"),
            passcode: None,
            scheduled_start: None,
            created_at: Utc::now(),
        };
        assert!(session.is_host(&UserId::from("host")));
        assert!(!session.is_host(&UserId::from("guest")));
    }
}
