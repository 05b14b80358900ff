//! Recording pipeline.
//!
//! Mixes the local outgoing media with the remote views on screen into one
//! stream, then on stop finalizes it into a single artifact, uploads it and
//! records who saved it.

mod pipeline;
mod storage;

pub use pipeline::{artifact_name, RecordingPipeline};
pub use storage::{FsObjectStorage, ObjectStorage};

use crate::errors::SessionError;
use crate::media::MediaStream;
use async_trait::async_trait;
use bytes::Bytes;

/// Combines several streams into one capture.
#[async_trait]
pub trait MediaMixer: Send + Sync {
    /// Begin mixing `sources`. Streams added later are not included.
    async fn start(&self, sources: &[MediaStream]) -> Result<Box<dyn MixedCapture>, SessionError>;
}

/// A running mix.
#[async_trait]
pub trait MixedCapture: Send + Sync {
    /// Stop mixing and return the encoded artifact.
    async fn finalize(&mut self) -> Result<Bytes, SessionError>;
}
