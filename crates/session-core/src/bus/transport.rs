use super::Envelope;
use crate::errors::SessionError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of envelopes for one topic. An `Err` item or the end of the stream
/// means the subscription is broken and must be re-established.
pub type EnvelopeStream = BoxStream<'static, Result<Envelope, SessionError>>;

/// Raw pub/sub transport underneath the bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), SessionError>;

    async fn subscribe(&self, topic: &str) -> Result<EnvelopeStream, SessionError>;
}
