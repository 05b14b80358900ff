//! In-process transport on top of `tokio::sync::broadcast`.

use super::{BusTransport, Envelope, EnvelopeStream};
use crate::errors::SessionError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

const TOPIC_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    topics: HashMap<String, broadcast::Sender<Envelope>>,
    published: Vec<(String, Envelope)>,
}

/// Single-process bus. Also records every publish for assertions.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes published on `topic`, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<Envelope> {
        let inner = self.inner.lock().await;
        inner
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Live subscriber count on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.topics.get(topic).map_or(0, broadcast::Sender::receiver_count)
    }
}

#[async_trait]
impl BusTransport for MemoryTransport {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        inner
            .published
            .push((topic.to_string(), envelope.clone()));
        if let Some(sender) = inner.topics.get(topic) {
            // No receivers is not an error for pub/sub.
            let _ = sender.send(envelope.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<EnvelopeStream, SessionError> {
        let mut inner = self.inner.lock().await;
        let receiver = inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(envelope) => Some((Ok(envelope), receiver)),
                Err(RecvError::Lagged(skipped)) => Some((
                    Err(SessionError::Transport(format!(
                        "subscriber lagged, {skipped} envelopes skipped"
                    ))),
                    receiver,
                )),
                Err(RecvError::Closed) => None,
            }
        });
        Ok(Box::pin(stream))
    }
}
