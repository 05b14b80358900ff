use super::{timed, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{SessionId, UserId};
use session_core::errors::SessionError;
use session_core::models::{NewSession, Session};
use session_core::store::SessionRepository;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    host_id: String,
    passcode: Option<String>,
    scheduled_start: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: SessionId::from(row.id),
            host: UserId::from(row.host_id),
            passcode: row.passcode.map(SecretString::from),
            scheduled_start: row.scheduled_start,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    #[instrument(skip_all, fields(session_id = %new.id))]
    async fn create_session(&self, new: NewSession) -> Result<Session, SessionError> {
        let row: Option<SessionRow> = timed(
            "create_session",
            sqlx::query_as(
                r#"
                INSERT INTO sessions (id, host_id, passcode, scheduled_start)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                RETURNING id, host_id, passcode, scheduled_start, created_at
                "#,
            )
            .bind(new.id.as_str())
            .bind(new.host.as_str())
            .bind(new.passcode.as_ref().map(|p| p.expose_secret().to_string()))
            .bind(new.scheduled_start)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Session::from)
            .ok_or_else(|| SessionError::Conflict(format!("Session {} already exists", new.id)))
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let row: Option<SessionRow> = timed(
            "get_session",
            sqlx::query_as(
                r#"
                SELECT id, host_id, passcode, scheduled_start, created_at
                FROM sessions
                WHERE id = $1
                "#,
            )
            .bind(id.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(Session::from))
    }
}
