//! Parley Session Service
//!
//! Admission API for meeting sessions: join requests, host decisions and
//! session history, backed by Postgres and the Redis signaling bus.

use common::secret::ExposeSecret;
use session_core::admission::AdmissionRegistry;
use session_core::bus::{BusPublisher, RedisTransport};
use session_service::config::Config;
use session_service::handlers::DependencyProbe;
use session_service::observability::metrics::init_metrics_recorder;
use session_service::repositories::PgStore;
use session_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration is needed before tracing to pick the log format.
    let config = Config::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "session_service=info,session_core=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!(
        service_id = %config.service_id,
        bind_address = %config.bind_address,
        "Starting Session Service"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(config.database.postgres_url.expose_secret())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    info!("Database connection established");

    let bus = Arc::new(
        RedisTransport::connect(config.redis.url.expose_secret())
            .await
            .map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?,
    );

    let store = PgStore::new(pool);
    let registry = AdmissionRegistry::new(
        Arc::new(store.clone()),
        Some(BusPublisher::new(bus.clone(), &config.service_id)),
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState {
        store: Arc::new(store.clone()),
        registry,
        readiness: Arc::new(DependencyProbe::new(store, bus)),
        config,
    });
    let app = routes::build_routes(state, metrics_handle);

    info!("Session Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Session Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
