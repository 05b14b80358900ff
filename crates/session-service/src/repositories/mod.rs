//! Postgres persistence for the session core.
//!
//! [`PgStore`] implements every repository trait of
//! [`session_core::store::Store`], one file per trait. All queries are
//! parameterized; ids and message bodies are never logged.

mod descriptors;
mod messages;
mod participants;
mod recordings;
mod sessions;

use crate::observability::metrics::record_db_query;
use session_core::errors::SessionError;
use sqlx::PgPool;
use std::future::Future;
use std::time::Instant;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query; used by the readiness probe.
    pub async fn ping(&self) -> Result<(), SessionError> {
        timed("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}

/// Run a query, record its latency and map failures to `SessionError::Store`.
async fn timed<T, F>(operation: &'static str, query: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = query.await;
    record_db_query(operation, result.is_ok(), start.elapsed());
    result.map_err(|e| {
        tracing::error!(target: "session.service.db", operation, error = %e, "Query failed");
        SessionError::Store(format!("{operation}: {e}"))
    })
}
