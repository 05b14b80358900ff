//! Session coordination error types.
//!
//! Every fallible operation in this crate returns [`SessionError`]. The
//! variant decides how a failure propagates: authorization and existence
//! failures surface to the caller, negotiation failures stay local to one
//! peer link, transport failures are retried by the bus, and device or
//! upload failures end the action that raised them.

use thiserror::Error;

/// Session coordination error type.
///
/// Maps to stable error codes:
/// - `Unauthorized`: `UNAUTHORIZED`
/// - `NotFound`: `NOT_FOUND`
/// - `Conflict`: `CONFLICT`
/// - `BadRequest`: `BAD_REQUEST`
/// - `DeviceDenied`: `DEVICE_DENIED`
/// - `NegotiationFailed`: `NEGOTIATION_FAILED`
/// - `UploadFailed`: `UPLOAD_FAILED`
/// - `Transport`, `Store`, `Internal`: `INTERNAL_ERROR`
#[derive(Debug, Error)]
pub enum SessionError {
    /// Caller lacks the role required for the operation (usually: not host).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session or participant record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local camera, microphone or display capture was refused.
    #[error("Media device denied: {0}")]
    DeviceDenied(String),

    /// Offer/answer exchange with a single peer failed.
    #[error("Negotiation failed with {peer}: {reason}")]
    NegotiationFailed { peer: String, reason: String },

    /// Recording artifact could not be written to object storage.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Signaling bus publish or subscribe failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Relational store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Operation conflicts with current state (e.g. capture already active).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error (channel closed, actor gone).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::Unauthorized(_) => "UNAUTHORIZED",
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::DeviceDenied(_) => "DEVICE_DENIED",
            SessionError::NegotiationFailed { .. } => "NEGOTIATION_FAILED",
            SessionError::UploadFailed(_) => "UPLOAD_FAILED",
            SessionError::Conflict(_) => "CONFLICT",
            SessionError::BadRequest(_) => "BAD_REQUEST",
            SessionError::Transport(_) | SessionError::Store(_) | SessionError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Transport(_) | SessionError::Store(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SessionError::Unauthorized(msg)
            | SessionError::NotFound(msg)
            | SessionError::Conflict(msg)
            | SessionError::BadRequest(msg) => msg.clone(),
            SessionError::DeviceDenied(_) => "Camera or microphone access was denied".to_string(),
            SessionError::NegotiationFailed { .. } => {
                "Could not establish a media connection".to_string()
            }
            SessionError::UploadFailed(_) => "Recording could not be saved".to_string(),
        }
    }

    /// Whether the bus should retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::BadRequest(format!("invalid payload: {err}"))
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::Transport(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            SessionError::Unauthorized("not host".to_string()).error_code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            SessionError::NotFound("session".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            SessionError::NegotiationFailed {
                peer: "conn-1".to_string(),
                reason: "sdp".to_string()
            }
            .error_code(),
            "NEGOTIATION_FAILED"
        );
        assert_eq!(
            SessionError::Transport("reset".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            SessionError::Store("pool".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = SessionError::Store("connection refused to 10.0.0.5".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
        assert!(!err.client_message().contains("10.0.0.5"));

        let err = SessionError::Transport("redis://cache:6379 reset".to_string());
        assert!(!err.client_message().contains("redis"));
    }

    #[test]
    fn test_client_message_passes_through_user_facing_reasons() {
        let err = SessionError::Unauthorized("Only the host may decide".to_string());
        assert_eq!(err.client_message(), "Only the host may decide");
    }

    #[test]
    fn test_only_transport_is_transient() {
        assert!(SessionError::Transport("x".to_string()).is_transient());
        assert!(!SessionError::UploadFailed("x".to_string()).is_transient());
        assert!(!SessionError::DeviceDenied("x".to_string()).is_transient());
    }

    #[test]
    fn test_json_error_becomes_bad_request() {
        let err: SessionError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }
}
