//! Scripted media devices and peer connections.
//!
//! `MockPeerConnection` reports the link as connected as soon as either side
//! completes its half of the offer/answer exchange, and hands over a fake
//! remote stream at the same time. Every call is recorded for assertions.
//!
//! Signaling is stateful: while a local offer or ICE restart is outstanding
//! the link rejects remote offers, answers are only taken against an
//! outstanding local offer, and `rollback` clears it.

use async_trait::async_trait;
use common::types::ConnectionId;
use session_core::bus::IceCandidate;
use session_core::errors::SessionError;
use session_core::media::{
    LinkEvent, LinkEventKind, LinkId, MediaDevices, MediaStream, MediaTrack, PeerConnection,
    PeerConnectionFactory, TrackKind, TrackSource,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock camera, microphone and display capture.
#[derive(Debug, Default)]
pub struct MockMediaDevices {
    deny_user_media: AtomicBool,
    deny_display: AtomicBool,
    inner: Mutex<DevicesInner>,
}

#[derive(Debug, Default)]
struct DevicesInner {
    captured: Vec<MediaStream>,
    displays: Vec<MediaStream>,
    released: Vec<String>,
}

impl MockMediaDevices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse camera and microphone access.
    #[must_use]
    pub fn denying_user_media() -> Self {
        let devices = Self::default();
        devices.deny_user_media.store(true, Ordering::SeqCst);
        devices
    }

    pub fn set_deny_display(&self, deny: bool) {
        self.deny_display.store(deny, Ordering::SeqCst);
    }

    /// Most recent display capture, if any.
    pub fn last_display(&self) -> Option<MediaStream> {
        self.inner.lock().unwrap().displays.last().cloned()
    }

    /// Ids of released streams, in release order.
    pub fn released(&self) -> Vec<String> {
        self.inner.lock().unwrap().released.clone()
    }

    pub fn is_released(&self, stream: &MediaStream) -> bool {
        self.released().contains(&stream.id)
    }

    /// Streams captured and not yet released.
    pub fn live_streams(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .captured
            .iter()
            .chain(inner.displays.iter())
            .filter(|s| !inner.released.contains(&s.id))
            .count()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn capture_user_media(&self) -> Result<MediaStream, SessionError> {
        if self.deny_user_media.load(Ordering::SeqCst) {
            return Err(SessionError::DeviceDenied(
                "camera permission refused".to_string(),
            ));
        }
        let stream = MediaStream::camera();
        self.inner.lock().unwrap().captured.push(stream.clone());
        Ok(stream)
    }

    async fn capture_display(&self) -> Result<MediaStream, SessionError> {
        if self.deny_display.load(Ordering::SeqCst) {
            return Err(SessionError::DeviceDenied(
                "display capture refused".to_string(),
            ));
        }
        let stream = MediaStream::display();
        self.inner.lock().unwrap().displays.push(stream.clone());
        Ok(stream)
    }

    async fn release(&self, stream: &MediaStream) {
        stream.end();
        self.inner.lock().unwrap().released.push(stream.id.clone());
    }
}

/// One mock link. Shared between the factory and the actor under test.
#[derive(Debug)]
pub struct MockPeerConnection {
    pub peer: ConnectionId,
    pub link_id: LinkId,
    events: mpsc::Sender<LinkEvent>,
    fail_accept: bool,
    fail_replace: bool,
    connected: AtomicBool,
    closed: AtomicBool,
    local_offer: AtomicBool,
    rollbacks: AtomicUsize,
    offers_created: AtomicUsize,
    offers_accepted: AtomicUsize,
    answers_accepted: AtomicUsize,
    ice_restarts: AtomicUsize,
    candidates: Mutex<Vec<IceCandidate>>,
    video_sources: Mutex<Vec<TrackSource>>,
}

impl MockPeerConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ice_restarts(&self) -> usize {
        self.ice_restarts.load(Ordering::SeqCst)
    }

    pub fn offers_created(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn offers_accepted(&self) -> usize {
        self.offers_accepted.load(Ordering::SeqCst)
    }

    pub fn answers_accepted(&self) -> usize {
        self.answers_accepted.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// A local offer or restart is waiting for its answer.
    pub fn has_local_offer(&self) -> bool {
        self.local_offer.load(Ordering::SeqCst)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    /// Sources passed to `replace_video_track`, in call order.
    pub fn video_sources(&self) -> Vec<TrackSource> {
        self.video_sources.lock().unwrap().clone()
    }

    /// Emit a local ICE candidate as the real stack would.
    pub fn emit_candidate(&self, candidate: &str) {
        self.emit(LinkEventKind::LocalCandidate(IceCandidate {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }));
    }

    /// Simulate connectivity loss.
    pub fn emit_failure(&self, reason: &str) {
        self.emit(LinkEventKind::Failed(reason.to_string()));
    }

    fn emit(&self, kind: LinkEventKind) {
        let _ = self.events.try_send(LinkEvent {
            peer: self.peer.clone(),
            link_id: self.link_id,
            kind,
        });
    }

    fn signaling_error(&self, reason: &str) -> SessionError {
        SessionError::NegotiationFailed {
            peer: self.peer.to_string(),
            reason: reason.to_string(),
        }
    }

    fn mark_connected(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(LinkEventKind::Connected);
        self.emit(LinkEventKind::RemoteStream(MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio, TrackSource::Remote),
            MediaTrack::new(TrackKind::Video, TrackSource::Remote),
        ])));
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self) -> Result<String, SessionError> {
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst);
        self.local_offer.store(true, Ordering::SeqCst);
        Ok(format!("offer:{}:{}:{n}", self.peer, self.link_id))
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String, SessionError> {
        if self.fail_accept {
            return Err(SessionError::NegotiationFailed {
                peer: self.peer.to_string(),
                reason: "remote description rejected".to_string(),
            });
        }
        if self.has_local_offer() {
            return Err(self.signaling_error("offer collision"));
        }
        self.offers_accepted.fetch_add(1, Ordering::SeqCst);
        self.mark_connected();
        Ok(format!("answer-to:{sdp}"))
    }

    async fn accept_answer(&self, _sdp: &str) -> Result<(), SessionError> {
        if !self.local_offer.swap(false, Ordering::SeqCst) {
            return Err(self.signaling_error("answer without local offer"));
        }
        self.answers_accepted.fetch_add(1, Ordering::SeqCst);
        self.mark_connected();
        Ok(())
    }

    async fn rollback(&self) -> Result<(), SessionError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.local_offer.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<(), SessionError> {
        self.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn restart_ice(&self) -> Result<String, SessionError> {
        let n = self.ice_restarts.fetch_add(1, Ordering::SeqCst);
        self.local_offer.store(true, Ordering::SeqCst);
        Ok(format!("restart:{}:{}:{n}", self.peer, self.link_id))
    }

    async fn replace_video_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        if self.fail_replace {
            return Err(SessionError::NegotiationFailed {
                peer: self.peer.to_string(),
                reason: "sender rejected track".to_string(),
            });
        }
        self.video_sources.lock().unwrap().push(track.source);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Creates `MockPeerConnection`s and keeps every one it made.
#[derive(Debug, Default)]
pub struct MockPeerFactory {
    fail_accept: AtomicBool,
    fail_replace_for: Mutex<Option<ConnectionId>>,
    links: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockPeerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New links reject remote offers.
    pub fn set_fail_accept(&self, fail: bool) {
        self.fail_accept.store(fail, Ordering::SeqCst);
    }

    /// Links created towards `peer` from now on reject track replacement.
    pub fn fail_replace_for(&self, peer: &ConnectionId) {
        *self.fail_replace_for.lock().unwrap() = Some(peer.clone());
    }

    /// Every link created, oldest first.
    pub fn links(&self) -> Vec<Arc<MockPeerConnection>> {
        self.links.lock().unwrap().clone()
    }

    /// Newest link towards `peer`.
    pub fn link_to(&self, peer: &ConnectionId) -> Option<Arc<MockPeerConnection>> {
        self.links()
            .into_iter()
            .rev()
            .find(|l| &l.peer == peer)
    }

    /// Links not yet closed.
    pub fn open_links(&self) -> Vec<Arc<MockPeerConnection>> {
        self.links()
            .into_iter()
            .filter(|l| !l.is_closed())
            .collect()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerFactory {
    async fn create(
        &self,
        peer: &ConnectionId,
        link_id: LinkId,
        _local: &MediaStream,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Arc<dyn PeerConnection>, SessionError> {
        let fail_replace = self.fail_replace_for.lock().unwrap().as_ref() == Some(peer);
        let link = Arc::new(MockPeerConnection {
            peer: peer.clone(),
            link_id,
            events,
            fail_accept: self.fail_accept.load(Ordering::SeqCst),
            fail_replace,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            local_offer: AtomicBool::new(false),
            rollbacks: AtomicUsize::new(0),
            offers_created: AtomicUsize::new(0),
            offers_accepted: AtomicUsize::new(0),
            answers_accepted: AtomicUsize::new(0),
            ice_restarts: AtomicUsize::new(0),
            candidates: Mutex::new(Vec::new()),
            video_sources: Mutex::new(Vec::new()),
        });
        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok(link)
    }
}
