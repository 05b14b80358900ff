//! Redis pub/sub transport.
//!
//! Publishing reuses one multiplexed connection (cloned per call). Each
//! subscription opens a dedicated pub/sub connection, since a connection in
//! subscribe mode cannot issue other commands.

use super::{BusTransport, Envelope, EnvelopeStream};
use crate::errors::SessionError;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{info, instrument};

pub struct RedisTransport {
    client: redis::Client,
    connection: MultiplexedConnection,
}

impl RedisTransport {
    /// Open a client and establish the publishing connection.
    #[instrument(skip_all, name = "session.bus.redis.connect")]
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(target: "session.bus", "Redis bus transport connected");
        Ok(Self { client, connection })
    }

    /// Round-trip a PING on the publishing connection.
    pub async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl BusTransport for RedisTransport {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), SessionError> {
        let payload = serde_json::to_string(envelope)
            .map_err(|e| SessionError::Internal(format!("envelope encode failed: {e}")))?;
        let mut conn = self.connection.clone();
        let _receivers: i64 = conn.publish(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<EnvelopeStream, SessionError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let messages = pubsub.into_on_message().map(|msg| {
            let payload: String = msg
                .get_payload()
                .map_err(|e| SessionError::BadRequest(format!("non-text payload: {e}")))?;
            serde_json::from_str::<Envelope>(&payload).map_err(SessionError::from)
        });
        // The server closing the connection ends the message stream; surface
        // that as a transport failure so the subscriber reconnects.
        let closed = futures::stream::once(async {
            Err(SessionError::Transport("pub/sub connection closed".to_string()))
        });
        Ok(Box::pin(messages.chain(closed)))
    }
}
