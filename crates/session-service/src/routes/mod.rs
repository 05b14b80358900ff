//! HTTP routes for the Session Service.
//!
//! Defines the Axum router and application state.

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::handlers::{self, ReadinessProbe};
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use session_core::admission::AdmissionRegistry;
use session_core::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for read endpoints. The registry shares the same store.
    pub store: Arc<dyn Store>,

    /// Admission state machine; publishes admission events on the bus.
    pub registry: AdmissionRegistry,

    /// Dependency checks for `/ready`.
    pub readiness: Arc<dyn ReadinessProbe>,

    pub config: Config,
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - public, unversioned
/// - `/api/v1/sessions/:session_id/...` - require a Bearer token
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let jwt_validator = Arc::new(JwtValidator::new(&state.config.jwt_secret));
    let auth_state = Arc::new(AuthState { jwt_validator });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/v1/sessions/:session_id/join",
            post(handlers::join_session),
        )
        .route(
            "/api/v1/sessions/:session_id/pending",
            get(handlers::list_pending),
        )
        .route(
            "/api/v1/sessions/:session_id/participants/me",
            delete(handlers::leave_session),
        )
        .route(
            "/api/v1/sessions/:session_id/participants/:user_id/decision",
            post(handlers::decide_participant),
        )
        .route(
            "/api/v1/sessions/:session_id/messages",
            get(handlers::list_messages),
        )
        .route(
            "/api/v1/sessions/:session_id/recordings",
            get(handlers::list_recordings),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
