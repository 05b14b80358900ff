use super::{timed, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use session_core::errors::SessionError;
use session_core::models::Recording;
use session_core::store::RecordingRepository;
use tracing::instrument;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RecordingRow {
    id: Uuid,
    session_id: String,
    uploader_id: String,
    filename: String,
    storage_path: String,
    created_at: DateTime<Utc>,
}

impl From<RecordingRow> for Recording {
    fn from(row: RecordingRow) -> Self {
        Self {
            id: row.id,
            session_id: SessionId::from(row.session_id),
            uploader: UserId::from(row.uploader_id),
            filename: row.filename,
            path: row.storage_path,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl RecordingRepository for PgStore {
    #[instrument(skip_all, fields(session_id = %recording.session_id))]
    async fn insert_recording(&self, recording: &Recording) -> Result<(), SessionError> {
        timed(
            "insert_recording",
            sqlx::query(
                r#"
                INSERT INTO recordings (id, session_id, uploader_id, filename, storage_path, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(recording.id)
            .bind(recording.session_id.as_str())
            .bind(recording.uploader.as_str())
            .bind(&recording.filename)
            .bind(&recording.path)
            .bind(recording.created_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn list_recordings(&self, session: &SessionId) -> Result<Vec<Recording>, SessionError> {
        let rows: Vec<RecordingRow> = timed(
            "list_recordings",
            sqlx::query_as(
                r#"
                SELECT id, session_id, uploader_id, filename, storage_path, created_at
                FROM recordings
                WHERE session_id = $1
                ORDER BY created_at DESC
                "#,
            )
            .bind(session.as_str())
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.into_iter().map(Recording::from).collect())
    }
}
