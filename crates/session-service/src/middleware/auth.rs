//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, validates it
//! and injects the claims into request extensions.

use crate::auth::JwtValidator;
use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_validator: Arc<JwtValidator>,
}

/// Reject requests without a valid `Authorization: Bearer <token>` header.
///
/// Returns 401 with a `WWW-Authenticate` header when the token is missing
/// or invalid. Handlers read the claims with `Extension<Claims>`.
#[instrument(skip_all, name = "session.service.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ServiceError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "session.service.middleware.auth", "Missing Authorization header");
            ServiceError::InvalidToken("Missing Authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "session.service.middleware.auth", "Invalid Authorization header format");
        ServiceError::InvalidToken("Invalid Authorization header format".to_string())
    })?;

    let claims = state.jwt_validator.validate(token)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
