use super::{timed, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use session_core::errors::SessionError;
use session_core::models::{ChatMessage, ReactionEvent};
use session_core::store::MessageRepository;
use tracing::instrument;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: Uuid,
    session_id: String,
    sender_id: String,
    body: String,
    sent_at: DateTime<Utc>,
}

impl From<ChatRow> for ChatMessage {
    fn from(row: ChatRow) -> Self {
        Self {
            id: row.id,
            session_id: SessionId::from(row.session_id),
            sender: UserId::from(row.sender_id),
            text: row.body,
            sent_at: row.sent_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    #[instrument(skip_all, fields(session_id = %message.session_id))]
    async fn append_chat(&self, message: &ChatMessage) -> Result<(), SessionError> {
        timed(
            "append_chat",
            sqlx::query(
                r#"
                INSERT INTO chat_messages (id, session_id, sender_id, body, sent_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(message.id)
            .bind(message.session_id.as_str())
            .bind(message.sender.as_str())
            .bind(&message.text)
            .bind(message.sent_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session))]
    async fn list_chat(&self, session: &SessionId) -> Result<Vec<ChatMessage>, SessionError> {
        let rows: Vec<ChatRow> = timed(
            "list_chat",
            sqlx::query_as(
                r#"
                SELECT id, session_id, sender_id, body, sent_at
                FROM chat_messages
                WHERE session_id = $1
                ORDER BY sent_at, seq
                "#,
            )
            .bind(session.as_str())
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    #[instrument(skip_all, fields(session_id = %reaction.session_id))]
    async fn append_reaction(&self, reaction: &ReactionEvent) -> Result<(), SessionError> {
        timed(
            "append_reaction",
            sqlx::query(
                r#"
                INSERT INTO reactions (id, session_id, sender_id, symbol, sent_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(reaction.id)
            .bind(reaction.session_id.as_str())
            .bind(reaction.sender.as_str())
            .bind(&reaction.symbol)
            .bind(reaction.sent_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
