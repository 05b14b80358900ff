//! Presence & signaling bus.
//!
//! Per-session pub/sub carrying three kinds of traffic, each on its own
//! topic:
//!
//! - `session:{id}:admission` - participant status changes
//! - `session:{id}:signal` - peer discovery and offer/answer/candidate relay
//! - `session:{id}:chat` - chat messages and reactions
//!
//! Publishing goes through a cloneable [`BusPublisher`] that stamps each
//! message with a per-publisher sequence number. Consuming goes through a
//! [`SignalingBus`], which resubscribes with exponential backoff after
//! transport failures and drops envelopes it has already delivered.

pub mod backoff;
mod memory;
mod redis;
mod subscriber;
mod transport;

pub use backoff::Backoff;
pub use memory::MemoryTransport;
pub use redis::RedisTransport;
pub use subscriber::{BusPublisher, SignalingBus, SubscriptionHandle};
pub use transport::{BusTransport, EnvelopeStream};

use crate::models::{ChatMessage, ParticipantRecord, ReactionEvent};
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};
use serde::{Deserialize, Serialize};

#[must_use]
pub fn admission_topic(session: &SessionId) -> String {
    format!("session:{session}:admission")
}

#[must_use]
pub fn signal_topic(session: &SessionId) -> String {
    format!("session:{session}:signal")
}

#[must_use]
pub fn chat_topic(session: &SessionId) -> String {
    format!("session:{session}:chat")
}

/// Bounded label for a topic name (the suffix after the last `:`).
#[must_use]
pub fn topic_kind(topic: &str) -> &'static str {
    match topic.rsplit(':').next() {
        Some("admission") => "admission",
        Some("signal") => "signal",
        Some("chat") => "chat",
        _ => "other",
    }
}

/// Wire unit of the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per publisher instance.
    pub publisher: String,
    /// Strictly increasing per publisher, starting at 1.
    pub seq: u64,
    pub sent_at: DateTime<Utc>,
    pub message: BusMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    Admission(AdmissionEvent),
    Signal(SignalMessage),
    Chat(ChatMessage),
    Reaction(ReactionEvent),
}

/// Participant status change fanned out to the participant and the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdmissionEvent {
    /// A new pending record was created.
    Requested { record: ParticipantRecord },
    /// The host approved or denied a pending record.
    Resolved { record: ParticipantRecord },
    /// The participant left and the record is gone.
    Removed {
        session_id: SessionId,
        user_id: UserId,
    },
}

impl AdmissionEvent {
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            AdmissionEvent::Requested { record } | AdmissionEvent::Resolved { record } => {
                &record.user_id
            }
            AdmissionEvent::Removed { user_id, .. } => user_id,
        }
    }
}

/// Negotiation message between two connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub from: ConnectionId,
    pub from_user: UserId,
    /// `None` broadcasts to every connection in the session.
    pub to: Option<ConnectionId>,
    /// Link generation chosen by the offerer; answers and candidates echo it.
    #[serde(default)]
    pub link_id: u64,
    pub payload: SignalPayload,
}

impl SignalMessage {
    /// Whether `me` should act on this message.
    #[must_use]
    pub fn is_for(&self, me: &ConnectionId) -> bool {
        &self.from != me && self.to.as_ref().map_or(true, |to| to == me)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPayload {
    /// A descriptor was registered; receivers initiate toward the sender.
    Announce,
    Offer { sdp: String, restart: bool },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
    /// The sender is leaving; receivers drop the link.
    Depart,
}

impl SignalPayload {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Announce => "announce",
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate { .. } => "candidate",
            SignalPayload::Depart => "depart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}
