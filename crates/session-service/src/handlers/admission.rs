//! Admission endpoints: join, waiting list, host decisions, leave.

use crate::auth::Claims;
use crate::errors::ServiceError;
use crate::models::{DecisionRequest, DecisionResponse, JoinRequest, JoinResponse, PendingParticipant};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use common::types::{SessionId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// `POST /api/v1/sessions/:session_id/join`
///
/// Checks the passcode, then records the join request. The host is
/// approved immediately; anyone else gets `pending` (or the status
/// already on record).
#[instrument(skip_all, name = "session.service.join", fields(session_id = %session_id))]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
    Json(body): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ServiceError> {
    let session = SessionId::from(session_id);
    let user = claims.user_id();

    state
        .registry
        .verify_passcode(&session, &user, body.passcode.as_deref())
        .await?;
    let status = state.registry.request_join(&session, &user).await?;

    Ok(Json(JoinResponse { status }))
}

/// `GET /api/v1/sessions/:session_id/pending` (host only)
#[instrument(skip_all, name = "session.service.pending", fields(session_id = %session_id))]
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<PendingParticipant>>, ServiceError> {
    let pending = state
        .registry
        .list_pending(&SessionId::from(session_id), &claims.user_id())
        .await?;

    Ok(Json(pending.into_iter().map(PendingParticipant::from).collect()))
}

/// `POST /api/v1/sessions/:session_id/participants/:user_id/decision` (host only)
#[instrument(skip_all, name = "session.service.decide", fields(session_id = %session_id))]
pub async fn decide_participant(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path((session_id, user_id)): Path<(String, String)>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ServiceError> {
    let decision = state
        .registry
        .decide(
            &SessionId::from(session_id),
            &UserId::from(user_id),
            body.verdict,
            &claims.user_id(),
        )
        .await?;

    Ok(Json(DecisionResponse {
        applied: decision.applied,
        status: decision.status,
    }))
}

/// `DELETE /api/v1/sessions/:session_id/participants/me`
///
/// Removes the caller's own record. Succeeds when there is none.
#[instrument(skip_all, name = "session.service.leave", fields(session_id = %session_id))]
pub async fn leave_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state
        .registry
        .leave(&SessionId::from(session_id), &claims.user_id())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
