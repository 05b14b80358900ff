//! Health check handlers.
//!
//! - `/health`: liveness, returns OK if the process is running
//! - `/ready`: readiness, checks the database and the bus

use crate::models::ReadinessResponse;
use crate::repositories::PgStore;
use crate::routes::AppState;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use session_core::bus::RedisTransport;
use session_core::errors::SessionError;
use std::sync::Arc;

/// Dependency checks behind `/ready`.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check_database(&self) -> Result<(), SessionError>;

    async fn check_bus(&self) -> Result<(), SessionError>;
}

/// Probe for the deployed dependencies.
pub struct DependencyProbe {
    store: PgStore,
    bus: Arc<RedisTransport>,
}

impl DependencyProbe {
    pub fn new(store: PgStore, bus: Arc<RedisTransport>) -> Self {
        Self { store, bus }
    }
}

#[async_trait]
impl ReadinessProbe for DependencyProbe {
    async fn check_database(&self) -> Result<(), SessionError> {
        self.store.ping().await
    }

    async fn check_bus(&self) -> Result<(), SessionError> {
        self.bus.ping().await
    }
}

/// Liveness probe handler. Does not check dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when the database and bus both answer, 503 otherwise.
/// The response never says why; the cause is logged.
#[tracing::instrument(skip_all, name = "session.service.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.readiness.check_database().await {
        tracing::warn!(target: "session.service.health", error = %e, "Readiness check failed: database");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                bus: None,
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    if let Err(e) = state.readiness.check_bus().await {
        tracing::warn!(target: "session.service.health", error = %e, "Readiness check failed: bus");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("healthy"),
                bus: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            bus: Some("healthy"),
            error: None,
        }),
    )
}
