//! A bus transport that can be made to misbehave.
//!
//! Wraps `MemoryTransport`. Tests can make the next N subscribe calls fail,
//! break every open subscription stream at once the way a Redis connection
//! reset would, or hold publishes back and release them together to force
//! messages to cross in flight.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use session_core::bus::{BusTransport, Envelope, EnvelopeStream, MemoryTransport};
use session_core::errors::SessionError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FlakyTransport {
    inner: Arc<MemoryTransport>,
    failing_subscribes: AtomicUsize,
    breaker: Mutex<CancellationToken>,
    subscribe_attempts: Mutex<Vec<(String, Instant)>>,
    held: Mutex<Option<Vec<(String, Envelope)>>>,
}

impl FlakyTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying in-memory transport, for publish assertions.
    pub fn memory(&self) -> &Arc<MemoryTransport> {
        &self.inner
    }

    /// Fail the next `n` subscribe calls.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// End every open subscription with a transport error.
    pub fn break_streams(&self) {
        let mut breaker = self.breaker.lock().unwrap();
        breaker.cancel();
        *breaker = CancellationToken::new();
    }

    /// Subscribe calls for `topic` (successful or not), with their times.
    pub fn subscribe_attempts(&self, topic: &str) -> Vec<Instant> {
        self.subscribe_attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Queue publishes instead of delivering them. Publishers still see
    /// success.
    pub fn hold_publishes(&self) {
        let mut held = self.held.lock().unwrap();
        if held.is_none() {
            *held = Some(Vec::new());
        }
    }

    /// Deliver every held publish in publish order and stop holding.
    pub async fn release_publishes(&self) {
        let held = self.held.lock().unwrap().take().unwrap_or_default();
        for (topic, envelope) in held {
            self.inner.publish(&topic, &envelope).await.unwrap();
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().as_ref().map_or(0, Vec::len)
    }
}

#[async_trait]
impl BusTransport for FlakyTransport {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), SessionError> {
        {
            let mut held = self.held.lock().unwrap();
            if let Some(queue) = held.as_mut() {
                queue.push((topic.to_string(), envelope.clone()));
                return Ok(());
            }
        }
        self.inner.publish(topic, envelope).await
    }

    async fn subscribe(&self, topic: &str) -> Result<EnvelopeStream, SessionError> {
        self.subscribe_attempts
            .lock()
            .unwrap()
            .push((topic.to_string(), Instant::now()));

        let should_fail = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SessionError::Transport("connection refused".to_string()));
        }

        let breaker = self.breaker.lock().unwrap().clone();
        let stream = self
            .inner
            .subscribe(topic)
            .await?
            .take_until(breaker.cancelled_owned())
            .chain(stream::once(async {
                Err(SessionError::Transport("connection reset".to_string()))
            }));
        Ok(Box::pin(stream))
    }
}
