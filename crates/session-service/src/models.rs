//! Request and response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_core::models::{ChatMessage, ParticipantRecord, ParticipantStatus, Recording, Verdict};
use uuid::Uuid;

/// Readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub passcode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub status: ParticipantStatus,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub verdict: Verdict,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub applied: bool,
    pub status: ParticipantStatus,
}

/// One entry in the host's waiting list.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingParticipant {
    pub user_id: String,
    pub requested_at: DateTime<Utc>,
}

impl From<ParticipantRecord> for PendingParticipant {
    fn from(record: ParticipantRecord) -> Self {
        Self {
            user_id: record.user_id.to_string(),
            requested_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender.to_string(),
            text: message.text,
            sent_at: message.sent_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordingResponse {
    pub id: Uuid,
    pub uploader: String,
    pub filename: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl From<Recording> for RecordingResponse {
    fn from(recording: Recording) -> Self {
        Self {
            id: recording.id,
            uploader: recording.uploader.to_string(),
            filename: recording.filename,
            path: recording.path,
            created_at: recording.created_at,
        }
    }
}
