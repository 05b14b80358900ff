//! Session Service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages for internal failures are generic; the detail is logged
//! server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use session_core::errors::SessionError;
use thiserror::Error;

/// Session Service error type.
///
/// Maps to HTTP status codes:
/// - InvalidToken: 401 Unauthorized
/// - Session(Unauthorized): 403 Forbidden
/// - Session(NotFound): 404 Not Found
/// - Session(BadRequest): 400 Bad Request
/// - Session(Conflict): 409 Conflict
/// - everything else: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Session(err) => match err {
                SessionError::Unauthorized(_) => StatusCode::FORBIDDEN,
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::BadRequest(_) => StatusCode::BAD_REQUEST,
                SessionError::Conflict(_) => StatusCode::CONFLICT,
                SessionError::DeviceDenied(_)
                | SessionError::NegotiationFailed { .. }
                | SessionError::UploadFailed(_)
                | SessionError::Transport(_)
                | SessionError::Store(_)
                | SessionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            ServiceError::InvalidToken(reason) => ("INVALID_TOKEN", reason.clone()),
            ServiceError::Session(err) => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(target: "session.service.errors", error = %err, "Request failed");
                }
                (err.error_code(), err.client_message())
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"parley\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_token_is_401_with_challenge() {
        let response =
            ServiceError::InvalidToken("The access token is invalid or expired".to_string())
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get("WWW-Authenticate")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(challenge.contains("invalid_token"));

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_not_host_is_403() {
        let err: ServiceError =
            SessionError::Unauthorized("Only the session host may do this".to_string()).into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("WWW-Authenticate").is_none());
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "Only the session host may do this");
    }

    #[tokio::test]
    async fn test_store_error_is_generic_500() {
        let err: ServiceError =
            SessionError::Store("connection refused to 10.1.2.3:5432".to_string()).into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("10.1.2.3"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SessionError::NotFound("s".to_string()), StatusCode::NOT_FOUND),
            (SessionError::BadRequest("b".to_string()), StatusCode::BAD_REQUEST),
            (SessionError::Conflict("c".to_string()), StatusCode::CONFLICT),
            (
                SessionError::Transport("t".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ServiceError::from(err).status_code(), expected);
        }
    }
}
