use super::{timed, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use session_core::errors::SessionError;
use session_core::models::{ParticipantRecord, ParticipantStatus};
use session_core::store::ParticipantRepository;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    session_id: String,
    user_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for ParticipantRecord {
    type Error = SessionError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: SessionId::from(row.session_id),
            user_id: UserId::from(row.user_id),
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ParticipantRepository for PgStore {
    /// The insert selects from `sessions` so host rows and rows for unknown
    /// sessions are never written. On conflict the existing row is touched
    /// and returned by the same statement, so a concurrent leave can never
    /// make an existing request look like a host join.
    #[instrument(skip_all, fields(session_id = %session))]
    async fn insert_pending_if_absent(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let row: Option<ParticipantRow> = timed(
            "insert_pending",
            sqlx::query_as(
                r#"
                INSERT INTO participants (session_id, user_id, status)
                SELECT s.id, $2, 'pending'
                FROM sessions s
                WHERE s.id = $1 AND s.host_id <> $2
                ON CONFLICT (session_id, user_id)
                DO UPDATE SET status = participants.status
                RETURNING session_id, user_id, status, created_at
                "#,
            )
            .bind(session.as_str())
            .bind(user.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;

        if let Some(row) = row {
            return Ok(Some(ParticipantRecord::try_from(row)?));
        }

        let host: Option<(String,)> = timed(
            "get_session_host",
            sqlx::query_as("SELECT host_id FROM sessions WHERE id = $1")
                .bind(session.as_str())
                .fetch_optional(&self.pool),
        )
        .await?;

        match host {
            Some((host_id,)) if host_id == user.as_str() => Ok(None),
            Some(_) => Err(SessionError::Store(
                "participant insert returned no row".to_string(),
            )),
            None => Err(SessionError::NotFound(format!("Session {session}"))),
        }
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn get_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let row: Option<ParticipantRow> = timed(
            "get_participant",
            sqlx::query_as(
                r#"
                SELECT session_id, user_id, status, created_at
                FROM participants
                WHERE session_id = $1 AND user_id = $2
                "#,
            )
            .bind(session.as_str())
            .bind(user.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(ParticipantRecord::try_from).transpose()
    }

    #[instrument(skip_all, fields(session_id = %session, status = %status))]
    async fn resolve_pending(
        &self,
        session: &SessionId,
        user: &UserId,
        status: ParticipantStatus,
    ) -> Result<Option<ParticipantRecord>, SessionError> {
        let row: Option<ParticipantRow> = timed(
            "resolve_pending",
            sqlx::query_as(
                r#"
                UPDATE participants
                SET status = $3
                WHERE session_id = $1 AND user_id = $2 AND status = 'pending'
                RETURNING session_id, user_id, status, created_at
                "#,
            )
            .bind(session.as_str())
            .bind(user.as_str())
            .bind(status.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(ParticipantRecord::try_from).transpose()
    }

    #[instrument(skip_all, fields(session_id = %session, status = %status))]
    async fn list_by_status(
        &self,
        session: &SessionId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>, SessionError> {
        let rows: Vec<ParticipantRow> = timed(
            "list_participants",
            sqlx::query_as(
                r#"
                SELECT session_id, user_id, status, created_at
                FROM participants
                WHERE session_id = $1 AND status = $2
                ORDER BY created_at, seq
                "#,
            )
            .bind(session.as_str())
            .bind(status.as_str())
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(ParticipantRecord::try_from).collect()
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn delete_participant(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<bool, SessionError> {
        let result = timed(
            "delete_participant",
            sqlx::query("DELETE FROM participants WHERE session_id = $1 AND user_id = $2")
                .bind(session.as_str())
                .bind(user.as_str())
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
