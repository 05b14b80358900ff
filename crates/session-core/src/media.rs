//! Local media and peer transport interfaces.
//!
//! The coordination layer never touches codecs or sockets. It drives these
//! traits, which the embedding application backs with real devices and a
//! real peer-connection stack.

use crate::bus::IceCandidate;
use crate::errors::SessionError;
use async_trait::async_trait;
use common::types::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    Display,
    Remote,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub source: TrackSource,
}

impl MediaTrack {
    #[must_use]
    pub fn new(kind: TrackKind, source: TrackSource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            source,
        }
    }
}

/// A bundle of tracks with an end signal.
///
/// Clones share the end signal: ending any clone ends them all. Display
/// capture ends when the user stops sharing from outside the application.
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
    ended: CancellationToken,
}

impl MediaStream {
    #[must_use]
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
            ended: CancellationToken::new(),
        }
    }

    /// Microphone plus camera.
    #[must_use]
    pub fn camera() -> Self {
        Self::new(vec![
            MediaTrack::new(TrackKind::Audio, TrackSource::Microphone),
            MediaTrack::new(TrackKind::Video, TrackSource::Camera),
        ])
    }

    /// Screen capture (video only).
    #[must_use]
    pub fn display() -> Self {
        Self::new(vec![MediaTrack::new(TrackKind::Video, TrackSource::Display)])
    }

    #[must_use]
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    /// Mark the stream as ended.
    pub fn end(&self) {
        self.ended.cancel();
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }

    /// Resolves once the stream has ended.
    pub async fn ended(&self) {
        self.ended.cancelled().await;
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Microphone and camera. Refusal is `DeviceDenied`.
    async fn capture_user_media(&self) -> Result<MediaStream, SessionError>;

    /// Screen capture. Refusal is `DeviceDenied`.
    async fn capture_display(&self) -> Result<MediaStream, SessionError>;

    /// Stop all tracks of a stream and free the devices.
    async fn release(&self, stream: &MediaStream);
}

/// Generation id of one link attempt. A peer that is renegotiated from
/// scratch gets a new id, so late events from the old attempt can be told
/// apart.
pub type LinkId = u64;

#[derive(Debug, Clone)]
pub enum LinkEventKind {
    /// Connectivity established.
    Connected,
    /// A local ICE candidate to relay to the peer.
    LocalCandidate(IceCandidate),
    /// Remote media arrived.
    RemoteStream(MediaStream),
    Failed(String),
    Closed,
}

#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub peer: ConnectionId,
    pub link_id: LinkId,
    pub kind: LinkEventKind,
}

/// One bidirectional media link to one peer.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<String, SessionError>;

    /// Apply a remote offer and produce the answer.
    async fn accept_offer(&self, sdp: &str) -> Result<String, SessionError>;

    async fn accept_answer(&self, sdp: &str) -> Result<(), SessionError>;

    /// Abandon our outstanding offer and return to a stable signaling state.
    async fn rollback(&self) -> Result<(), SessionError>;

    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<(), SessionError>;

    /// Begin an ICE restart and produce the new offer.
    async fn restart_ice(&self) -> Result<String, SessionError>;

    /// Swap the outgoing video in one step.
    async fn replace_video_track(&self, track: &MediaTrack) -> Result<(), SessionError>;

    async fn close(&self);
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a link carrying `local`. Lifecycle events for the link are
    /// delivered on `events`, tagged with `peer` and `link_id`.
    async fn create(
        &self,
        peer: &ConnectionId,
        link_id: LinkId,
        local: &MediaStream,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Arc<dyn PeerConnection>, SessionError>;
}
