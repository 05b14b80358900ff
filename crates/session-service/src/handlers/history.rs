//! Read-only session history: chat for members, recordings for the host.

use crate::auth::Claims;
use crate::errors::ServiceError;
use crate::models::{ChatMessageResponse, RecordingResponse};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use common::types::SessionId;
use session_core::errors::SessionError;
use session_core::store::{MessageRepository, RecordingRepository};
use std::sync::Arc;
use tracing::instrument;

/// `GET /api/v1/sessions/:session_id/messages`
///
/// Chat history, oldest first. Host and approved participants only.
#[instrument(skip_all, name = "session.service.messages", fields(session_id = %session_id))]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessageResponse>>, ServiceError> {
    let session = SessionId::from(session_id);
    if !state.registry.is_member(&session, &claims.user_id()).await? {
        return Err(SessionError::Unauthorized(
            "Only session members may read messages".to_string(),
        )
        .into());
    }

    let history = state.store.list_chat(&session).await?;
    Ok(Json(
        history.into_iter().map(ChatMessageResponse::from).collect(),
    ))
}

/// `GET /api/v1/sessions/:session_id/recordings` (host only, newest first)
#[instrument(skip_all, name = "session.service.recordings", fields(session_id = %session_id))]
pub async fn list_recordings(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<RecordingResponse>>, ServiceError> {
    let session = state.registry.session(&SessionId::from(session_id)).await?;
    if !session.is_host(&claims.user_id()) {
        return Err(SessionError::Unauthorized(
            "Only the session host may list recordings".to_string(),
        )
        .into());
    }

    let recordings = state.store.list_recordings(&session.id).await?;
    Ok(Json(
        recordings.into_iter().map(RecordingResponse::from).collect(),
    ))
}
