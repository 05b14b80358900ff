use super::{timed, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};
use session_core::errors::SessionError;
use session_core::models::SignalDescriptor;
use session_core::store::SignalRepository;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct DescriptorRow {
    session_id: String,
    connection_id: String,
    user_id: String,
    last_seen: DateTime<Utc>,
}

impl From<DescriptorRow> for SignalDescriptor {
    fn from(row: DescriptorRow) -> Self {
        Self {
            session_id: SessionId::from(row.session_id),
            connection_id: ConnectionId::from(row.connection_id),
            user_id: UserId::from(row.user_id),
            last_seen: row.last_seen,
        }
    }
}

#[async_trait]
impl SignalRepository for PgStore {
    #[instrument(skip_all, fields(session_id = %descriptor.session_id))]
    async fn register_descriptor(
        &self,
        descriptor: &SignalDescriptor,
    ) -> Result<(), SessionError> {
        timed(
            "register_descriptor",
            sqlx::query(
                r#"
                INSERT INTO signal_descriptors (session_id, connection_id, user_id, last_seen)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (session_id, connection_id)
                DO UPDATE SET user_id = EXCLUDED.user_id, last_seen = EXCLUDED.last_seen
                "#,
            )
            .bind(descriptor.session_id.as_str())
            .bind(descriptor.connection_id.as_str())
            .bind(descriptor.user_id.as_str())
            .bind(descriptor.last_seen)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn touch_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        let result = timed(
            "touch_descriptor",
            sqlx::query(
                r#"
                UPDATE signal_descriptors
                SET last_seen = $3
                WHERE session_id = $1 AND connection_id = $2
                "#,
            )
            .bind(session.as_str())
            .bind(connection.as_str())
            .bind(at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn deregister_descriptor(
        &self,
        session: &SessionId,
        connection: &ConnectionId,
    ) -> Result<(), SessionError> {
        timed(
            "deregister_descriptor",
            sqlx::query(
                "DELETE FROM signal_descriptors WHERE session_id = $1 AND connection_id = $2",
            )
            .bind(session.as_str())
            .bind(connection.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn list_live_descriptors(
        &self,
        session: &SessionId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalDescriptor>, SessionError> {
        let rows: Vec<DescriptorRow> = timed(
            "list_descriptors",
            sqlx::query_as(
                r#"
                SELECT session_id, connection_id, user_id, last_seen
                FROM signal_descriptors
                WHERE session_id = $1 AND last_seen >= $2
                ORDER BY connection_id
                "#,
            )
            .bind(session.as_str())
            .bind(since)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.into_iter().map(SignalDescriptor::from).collect())
    }
}
