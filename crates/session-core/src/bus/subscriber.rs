use super::{topic_kind, Backoff, BusMessage, BusTransport, Envelope, EnvelopeStream};
use crate::errors::SessionError;
use crate::observability::metrics;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cloneable publishing half of the bus.
///
/// Every clone shares one sequence counter. The counter stays locked until
/// the transport accepts the envelope, so envelopes from one publisher reach
/// the broker in sequence order even when clones publish concurrently.
#[derive(Clone)]
pub struct BusPublisher {
    transport: Arc<dyn BusTransport>,
    publisher_id: Arc<str>,
    seq: Arc<Mutex<u64>>,
}

impl BusPublisher {
    /// Create a publisher with a unique id derived from `label`.
    pub fn new(transport: Arc<dyn BusTransport>, label: &str) -> Self {
        Self {
            transport,
            publisher_id: Arc::from(format!("{label}-{}", Uuid::new_v4())),
            seq: Arc::new(Mutex::new(0)),
        }
    }

    #[must_use]
    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), SessionError> {
        let mut seq = self.seq.lock().await;
        *seq += 1;
        let envelope = Envelope {
            publisher: self.publisher_id.to_string(),
            seq: *seq,
            sent_at: Utc::now(),
            message,
        };
        let result = self.transport.publish(topic, &envelope).await;
        drop(seq);

        if let Err(e) = &result {
            metrics::record_publish_failure(topic_kind(topic));
            warn!(target: "session.bus", topic = %topic, error = %e, "Publish failed");
        }
        result
    }
}

/// Handle to one live subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    topic: String,
    cancel_token: CancellationToken,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Consuming half of the bus, owned by a single consumer.
///
/// Each subscription runs in its own task that forwards envelopes into the
/// consumer's queue. Dropping the bus cancels every subscription.
pub struct SignalingBus {
    transport: Arc<dyn BusTransport>,
    backoff: Backoff,
    cancel_token: CancellationToken,
    subscriptions: HashMap<String, ActiveSubscription>,
}

impl SignalingBus {
    pub fn new(
        transport: Arc<dyn BusTransport>,
        backoff: Backoff,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            backoff,
            cancel_token,
            subscriptions: HashMap::new(),
        }
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// The first transport subscribe is attempted before returning, so a
    /// caller that subscribes and then reads current state sees every event
    /// published after the read. If that attempt fails the background task
    /// keeps retrying with backoff. Subscribing twice to the same topic
    /// replaces the earlier subscription.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        handler: mpsc::Sender<Envelope>,
    ) -> SubscriptionHandle {
        self.unsubscribe(topic);

        let initial = match self.transport.subscribe(topic).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(target: "session.bus", topic = %topic, error = %e, "Initial subscribe failed, retrying in background");
                None
            }
        };

        let handle = SubscriptionHandle {
            topic: topic.to_string(),
            cancel_token: self.cancel_token.child_token(),
        };
        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.transport),
            topic.to_string(),
            handler,
            self.backoff,
            handle.cancel_token.clone(),
            initial,
        ));
        debug!(target: "session.bus", topic = %topic, "Subscribed");

        self.subscriptions.insert(
            topic.to_string(),
            ActiveSubscription {
                handle: handle.clone(),
                task,
            },
        );
        handle
    }

    /// Release the subscription for `topic`. Safe to call repeatedly.
    pub fn unsubscribe(&mut self, topic: &str) {
        if let Some(active) = self.subscriptions.remove(topic) {
            active.handle.cancel();
            debug!(target: "session.bus", topic = %topic, "Unsubscribed");
        }
    }

    /// Release every subscription. Safe to call repeatedly.
    pub fn unsubscribe_all(&mut self) {
        for (_, active) in self.subscriptions.drain() {
            active.handle.cancel();
        }
    }

    /// Topics with a live subscription.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|(_, a)| a.handle.is_active() && !a.task.is_finished())
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }
}

impl Drop for SignalingBus {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// Per-publisher sequence high-water marks for one subscription.
#[derive(Default)]
struct Dedup {
    high_water: HashMap<String, u64>,
}

impl Dedup {
    /// Returns true the first time an envelope is seen.
    fn admit(&mut self, envelope: &Envelope) -> bool {
        let mark = self
            .high_water
            .entry(envelope.publisher.clone())
            .or_insert(0);
        if envelope.seq <= *mark {
            return false;
        }
        *mark = envelope.seq;
        true
    }
}

/// A stream that stayed up this long before breaking counts as healthy even
/// if nothing was published on it.
const STABLE_STREAM: Duration = Duration::from_secs(10);

enum PumpExit {
    Stopped,
    /// `delivered` is true if at least one envelope came through.
    Broken { delivered: bool },
}

async fn run_subscription(
    transport: Arc<dyn BusTransport>,
    topic: String,
    handler: mpsc::Sender<Envelope>,
    backoff: Backoff,
    cancel_token: CancellationToken,
    initial: Option<EnvelopeStream>,
) {
    let kind = topic_kind(&topic);
    let mut dedup = Dedup::default();
    let mut attempt: u32 = 0;
    let mut next_stream = initial;

    loop {
        let stream = match next_stream.take() {
            Some(stream) => stream,
            None => {
                attempt = attempt.saturating_add(1);
                let delay = backoff.delay(attempt);
                warn!(
                    target: "session.bus",
                    topic = %topic,
                    attempt = attempt,
                    backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Resubscribing after transport failure"
                );
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                metrics::record_resubscribe(kind);
                match transport.subscribe(&topic).await {
                    Ok(stream) => {
                        info!(target: "session.bus", topic = %topic, attempt = attempt, "Resubscribed");
                        stream
                    }
                    Err(e) => {
                        warn!(target: "session.bus", topic = %topic, error = %e, "Resubscribe failed");
                        continue;
                    }
                }
            }
        };

        // A subscribe that succeeds only to break straight away keeps
        // escalating; the counter resets once the stream proved itself.
        let up_since = Instant::now();
        match pump(stream, &topic, &handler, &cancel_token, &mut dedup).await {
            PumpExit::Stopped => break,
            PumpExit::Broken { delivered } => {
                if delivered || up_since.elapsed() >= STABLE_STREAM {
                    attempt = 0;
                }
            }
        }
    }

    debug!(target: "session.bus", topic = %topic, "Subscription task exiting");
}

async fn pump(
    mut stream: EnvelopeStream,
    topic: &str,
    handler: &mpsc::Sender<Envelope>,
    cancel_token: &CancellationToken,
    dedup: &mut Dedup,
) -> PumpExit {
    let kind = topic_kind(topic);
    let mut delivered = false;
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => return PumpExit::Stopped,
            () = handler.closed() => {
                debug!(target: "session.bus", topic = %topic, "Consumer gone, ending subscription");
                return PumpExit::Stopped;
            }
            next = stream.next() => match next {
                Some(Ok(envelope)) => {
                    delivered = true;
                    if !dedup.admit(&envelope) {
                        metrics::record_duplicate_dropped(kind);
                        continue;
                    }
                    tokio::select! {
                        () = cancel_token.cancelled() => return PumpExit::Stopped,
                        sent = handler.send(envelope) => {
                            if sent.is_err() {
                                return PumpExit::Stopped;
                            }
                        }
                    }
                }
                Some(Err(e)) if e.is_transient() => {
                    warn!(target: "session.bus", topic = %topic, error = %e, "Subscription broken");
                    return PumpExit::Broken { delivered };
                }
                Some(Err(e)) => {
                    debug!(target: "session.bus", topic = %topic, error = %e, "Skipping undecodable envelope");
                }
                None => {
                    warn!(target: "session.bus", topic = %topic, "Subscription stream ended");
                    return PumpExit::Broken { delivered };
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bus::{MemoryTransport, SignalMessage, SignalPayload};
    use common::types::{ConnectionId, UserId};
    use std::time::Duration;

    fn announce() -> BusMessage {
        BusMessage::Signal(SignalMessage {
            from: ConnectionId::from("c1"),
            from_user: UserId::from("u1"),
            to: None,
            link_id: 0,
            payload: SignalPayload::Announce,
        })
    }

    #[test]
    fn test_dedup_drops_replayed_sequences() {
        let mut dedup = Dedup::default();
        let mut envelope = Envelope {
            publisher: "p".to_string(),
            seq: 1,
            sent_at: Utc::now(),
            message: announce(),
        };
        assert!(dedup.admit(&envelope));
        assert!(!dedup.admit(&envelope));

        envelope.seq = 2;
        assert!(dedup.admit(&envelope));

        envelope.publisher = "q".to_string();
        envelope.seq = 1;
        assert!(dedup.admit(&envelope));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber_in_order() {
        let transport = Arc::new(MemoryTransport::new());
        let publisher = BusPublisher::new(transport.clone(), "test");
        let mut bus = SignalingBus::new(transport, Backoff::default(), CancellationToken::new());

        let (tx, mut rx) = mpsc::channel(16);
        let handle = bus.subscribe("session:s:signal", tx).await;
        assert!(handle.is_active());

        publisher.publish("session:s:signal", announce()).await.unwrap();
        publisher.publish("session:s:signal", announce()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.publisher, publisher.publisher_id());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let transport = Arc::new(MemoryTransport::new());
        let mut bus = SignalingBus::new(
            transport.clone(),
            Backoff::default(),
            CancellationToken::new(),
        );

        let (tx, mut rx) = mpsc::channel(16);
        let handle = bus.subscribe("t", tx).await;
        bus.unsubscribe("t");
        bus.unsubscribe("t");
        bus.unsubscribe_all();
        assert!(!handle.is_active());
        assert!(bus.topics().is_empty());

        // The task drops its sender once cancelled.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[tokio::test]
    async fn test_cancelling_parent_token_stops_subscriptions() {
        let transport = Arc::new(MemoryTransport::new());
        let parent = CancellationToken::new();
        let mut bus = SignalingBus::new(transport, Backoff::default(), parent.clone());

        let (tx, mut rx) = mpsc::channel(16);
        let handle = bus.subscribe("t", tx).await;
        parent.cancel();
        assert!(!handle.is_active());

        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }
}
