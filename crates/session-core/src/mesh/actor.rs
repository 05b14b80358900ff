//! `MeshActor` - one per client per session.
//!
//! Turns discovery events into peer links and keeps them healthy. All state
//! lives in the actor task; the handle, bus subscriptions, link callbacks and
//! timers only ever talk to it through channels, so no two handlers for the
//! same client run at once.
//!
//! # Lifecycle
//!
//! 1. `start` subscribes to the signal and chat topics, registers and
//!    announces this client's descriptor, and offers to every live peer.
//! 2. `run` services commands, bus envelopes, link events and the health
//!    tick until `leave`, cancellation, or every handle is dropped.
//! 3. Teardown always runs exactly once on the way out.

use super::messages::{ClientEvent, MeshMessage, MeshSnapshot, PeerView};
use super::peer::{offer_action, LinkView, NegotiationRole, OfferAction, PeerState};
use crate::admission::AdmissionRegistry;
use crate::bus::{
    chat_topic, signal_topic, BusMessage, BusPublisher, BusTransport, Envelope, IceCandidate,
    SignalMessage, SignalPayload, SignalingBus,
};
use crate::config::MeshConfig;
use crate::errors::SessionError;
use crate::media::{
    LinkEvent, LinkEventKind, LinkId, MediaDevices, MediaStream, PeerConnection,
    PeerConnectionFactory,
};
use crate::models::{ChatMessage, ReactionEvent, Recording, SignalDescriptor};
use crate::observability::metrics;
use crate::recording::{MediaMixer, ObjectStorage, RecordingPipeline};
use crate::store::Store;
use chrono::Utc;
use common::types::{ConnectionId, SessionId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const BUS_CHANNEL_BUFFER: usize = 512;
const LINK_CHANNEL_BUFFER: usize = 512;
const EVENT_CHANNEL_BUFFER: usize = 1024;

/// Collaborators a mesh actor needs.
#[derive(Clone)]
pub struct MeshDeps {
    pub store: Arc<dyn Store>,
    pub registry: AdmissionRegistry,
    pub transport: Arc<dyn BusTransport>,
    pub devices: Arc<dyn MediaDevices>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub mixer: Arc<dyn MediaMixer>,
    pub storage: Arc<dyn ObjectStorage>,
    pub config: MeshConfig,
}

/// Handle to a `MeshActor`.
#[derive(Clone)]
pub struct MeshActorHandle {
    sender: mpsc::Sender<MeshMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    connection_id: ConnectionId,
}

impl MeshActorHandle {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Replace outgoing video on every link with a screen capture.
    pub async fn start_screen_share(&self) -> Result<(), SessionError> {
        self.request(|respond_to| MeshMessage::StartScreenShare { respond_to })
            .await?
    }

    /// Return every link to the camera.
    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        self.request(|respond_to| MeshMessage::StopScreenShare { respond_to })
            .await?
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        self.request(|respond_to| MeshMessage::SendChat { text, respond_to })
            .await?
    }

    pub async fn send_reaction(
        &self,
        symbol: impl Into<String>,
    ) -> Result<ReactionEvent, SessionError> {
        let symbol = symbol.into();
        self.request(|respond_to| MeshMessage::SendReaction { symbol, respond_to })
            .await?
    }

    pub async fn start_recording(&self) -> Result<(), SessionError> {
        self.request(|respond_to| MeshMessage::StartRecording { respond_to })
            .await?
    }

    pub async fn stop_recording(&self) -> Result<Recording, SessionError> {
        self.request(|respond_to| MeshMessage::StopRecording { respond_to })
            .await?
    }

    pub async fn state(&self) -> Result<MeshSnapshot, SessionError> {
        self.request(|respond_to| MeshMessage::GetState { respond_to })
            .await
    }

    /// Leave the session and tear everything down. Returns once teardown has
    /// finished. Calling it again, or after the actor stopped, is a no-op.
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(MeshMessage::Leave { respond_to: tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        // A dropped responder means the actor already finished teardown.
        let _ = rx.await;
        Ok(())
    }

    /// Cancel the actor. Teardown still runs.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MeshMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }
}

/// A started mesh: the handle, the application event stream, and the task.
pub struct MeshSession {
    pub handle: MeshActorHandle,
    pub events: mpsc::Receiver<ClientEvent>,
    pub task: JoinHandle<()>,
}

struct Peer {
    user_id: UserId,
    link_id: LinkId,
    state: PeerState,
    /// An ICE restart offer is out and unanswered.
    restart_pending: bool,
    connection: Arc<dyn PeerConnection>,
    remote_stream: Option<MediaStream>,
}

impl Peer {
    fn discovered(user_id: UserId, link_id: LinkId, connection: Arc<dyn PeerConnection>) -> Self {
        Self {
            user_id,
            link_id,
            state: PeerState::Discovered,
            restart_pending: false,
            connection,
            remote_stream: None,
        }
    }

    fn view(&self) -> LinkView {
        LinkView {
            state: self.state,
            link_id: self.link_id,
            restart_pending: self.restart_pending,
        }
    }
}

struct ScreenShare {
    stream: MediaStream,
    watcher: CancellationToken,
}

pub struct MeshActor {
    session_id: SessionId,
    user_id: UserId,
    connection_id: ConnectionId,
    deps: MeshDeps,
    receiver: mpsc::Receiver<MeshMessage>,
    /// Weak so that dropping every handle still ends the actor.
    self_sender: mpsc::WeakSender<MeshMessage>,
    cancel_token: CancellationToken,
    bus: SignalingBus,
    publisher: BusPublisher,
    bus_rx: mpsc::Receiver<Envelope>,
    bus_tx: mpsc::Sender<Envelope>,
    link_rx: mpsc::Receiver<LinkEvent>,
    link_tx: mpsc::Sender<LinkEvent>,
    events: mpsc::Sender<ClientEvent>,
    camera: Option<MediaStream>,
    screen: Option<ScreenShare>,
    peers: HashMap<ConnectionId, Peer>,
    recording: RecordingPipeline,
    torn_down: bool,
    messages_processed: u64,
}

impl MeshActor {
    /// Join the mesh for `session` as `user`, sending `local` media.
    ///
    /// Subscriptions are live before the descriptor is registered and peers
    /// are listed, so no announcement in between is missed. On error every
    /// partial step is undone; `local` stays owned by the caller.
    #[instrument(skip_all, name = "session.mesh.start", fields(session_id = %session_id, user_id = %user_id))]
    pub async fn start(
        deps: MeshDeps,
        session_id: SessionId,
        user_id: UserId,
        local: MediaStream,
        cancel_token: CancellationToken,
    ) -> Result<MeshSession, SessionError> {
        Self::start_with_connection_id(
            deps,
            session_id,
            user_id,
            ConnectionId::random(),
            local,
            cancel_token,
        )
        .await
    }

    /// `start` with a caller-chosen connection id. Ids decide politeness in
    /// offer collisions, so tests use this to pin which side yields.
    pub async fn start_with_connection_id(
        deps: MeshDeps,
        session_id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
        local: MediaStream,
        cancel_token: CancellationToken,
    ) -> Result<MeshSession, SessionError> {
        let (sender, receiver) = mpsc::channel(deps.config.mailbox_size);
        let (bus_tx, bus_rx) = mpsc::channel(BUS_CHANNEL_BUFFER);
        let (link_tx, link_rx) = mpsc::channel(LINK_CHANNEL_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        let bus = SignalingBus::new(
            Arc::clone(&deps.transport),
            deps.config.backoff,
            cancel_token.child_token(),
        );
        let publisher = BusPublisher::new(Arc::clone(&deps.transport), "mesh");
        let recording = RecordingPipeline::new(
            Arc::clone(&deps.mixer),
            Arc::clone(&deps.storage),
            Arc::clone(&deps.store),
        );

        let mut actor = Self {
            session_id: session_id.clone(),
            user_id,
            connection_id: connection_id.clone(),
            deps,
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            bus,
            publisher,
            bus_rx,
            bus_tx,
            link_rx,
            link_tx,
            events: events_tx,
            camera: Some(local),
            screen: None,
            peers: HashMap::new(),
            recording,
            torn_down: false,
            messages_processed: 0,
        };

        if let Err(e) = actor.startup().await {
            warn!(target: "session.mesh", error = %e, "Mesh startup failed, rolling back");
            // The caller still owns the local media on failure.
            actor.camera = None;
            actor.teardown(false).await;
            return Err(e);
        }

        let task = tokio::spawn(actor.run());
        let handle = MeshActorHandle {
            sender,
            cancel_token,
            session_id,
            connection_id,
        };
        Ok(MeshSession {
            handle,
            events: events_rx,
            task,
        })
    }

    async fn startup(&mut self) -> Result<(), SessionError> {
        self.bus
            .subscribe(&signal_topic(&self.session_id), self.bus_tx.clone())
            .await;
        self.bus
            .subscribe(&chat_topic(&self.session_id), self.bus_tx.clone())
            .await;

        let descriptor = SignalDescriptor {
            session_id: self.session_id.clone(),
            connection_id: self.connection_id.clone(),
            user_id: self.user_id.clone(),
            last_seen: Utc::now(),
        };
        self.deps.store.register_descriptor(&descriptor).await?;

        if let Err(e) = self.send_signal(None, 0, SignalPayload::Announce).await {
            // Peers listed below are still reached; later joiners find us
            // through their own listing.
            warn!(target: "session.mesh", error = %e, "Announce not published");
        }

        let since = Utc::now() - self.deps.config.descriptor_ttl_chrono();
        let live = self
            .deps
            .store
            .list_live_descriptors(&self.session_id, since)
            .await?;
        info!(
            target: "session.mesh",
            connection_id = %self.connection_id,
            live = live.len(),
            "Joined mesh"
        );
        for descriptor in live {
            self.initiate(descriptor.connection_id, descriptor.user_id)
                .await;
        }
        Ok(())
    }

    #[instrument(skip_all, name = "session.actor.mesh", fields(session_id = %self.session_id, connection_id = %self.connection_id))]
    async fn run(mut self) {
        let period = self.deps.config.health_interval;
        let mut health = interval_at(Instant::now() + period, period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "session.mesh", "MeshActor received cancellation signal");
                    self.teardown(true).await;
                    break;
                }

                _ = health.tick() => {
                    self.health_tick().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(MeshMessage::Leave { respond_to }) => {
                            self.teardown(true).await;
                            let _ = respond_to.send(());
                            break;
                        }
                        Some(message) => {
                            self.handle_message(message).await;
                            self.messages_processed += 1;
                        }
                        None => {
                            info!(target: "session.mesh", "All handles dropped, leaving");
                            self.teardown(true).await;
                            break;
                        }
                    }
                }

                Some(envelope) = self.bus_rx.recv() => {
                    self.handle_envelope(envelope).await;
                }

                Some(event) = self.link_rx.recv() => {
                    self.handle_link_event(event).await;
                }
            }
        }

        info!(
            target: "session.mesh",
            messages_processed = self.messages_processed,
            "MeshActor stopped"
        );
    }

    async fn handle_message(&mut self, message: MeshMessage) {
        match message {
            MeshMessage::StartScreenShare { respond_to } => {
                let result = self.start_screen_share().await;
                let _ = respond_to.send(result);
            }
            MeshMessage::StopScreenShare { respond_to } => {
                self.stop_screen_share().await;
                let _ = respond_to.send(Ok(()));
            }
            MeshMessage::SendChat { text, respond_to } => {
                let result = self.send_chat(&text).await;
                let _ = respond_to.send(result);
            }
            MeshMessage::SendReaction { symbol, respond_to } => {
                let result = self.send_reaction(&symbol).await;
                let _ = respond_to.send(result);
            }
            MeshMessage::StartRecording { respond_to } => {
                let sources = self.recording_sources();
                let result = self.recording.start_capture(&sources).await;
                let _ = respond_to.send(result);
            }
            MeshMessage::StopRecording { respond_to } => {
                let result = self.stop_recording().await;
                let _ = respond_to.send(result);
            }
            MeshMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            MeshMessage::DisplayEnded { stream_id } => {
                let current = self.screen.as_ref().map(|s| s.stream.id.clone());
                if current.as_deref() == Some(stream_id.as_str()) {
                    info!(target: "session.mesh", "Display capture ended by user");
                    self.stop_screen_share().await;
                }
            }
            MeshMessage::Leave { respond_to } => {
                // Normally intercepted in `run`.
                self.teardown(true).await;
                let _ = respond_to.send(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Bus traffic
    // ------------------------------------------------------------------

    async fn handle_envelope(&mut self, envelope: Envelope) {
        if envelope.publisher == self.publisher.publisher_id() {
            return;
        }
        match envelope.message {
            BusMessage::Signal(signal) => {
                if signal.is_for(&self.connection_id) {
                    self.handle_signal(signal).await;
                }
            }
            BusMessage::Chat(message) => self.emit(ClientEvent::ChatReceived(message)),
            BusMessage::Reaction(reaction) => {
                self.emit(ClientEvent::ReactionReceived(reaction));
            }
            BusMessage::Admission(_) => {}
        }
    }

    async fn handle_signal(&mut self, signal: SignalMessage) {
        let SignalMessage {
            from,
            from_user,
            link_id,
            payload,
            ..
        } = signal;
        debug!(
            target: "session.mesh",
            peer = %from,
            kind = payload.kind(),
            link_id = link_id,
            "Signal received"
        );

        match payload {
            SignalPayload::Announce => self.initiate(from, from_user).await,
            SignalPayload::Offer { sdp, restart } => {
                self.handle_offer(from, from_user, link_id, &sdp, restart)
                    .await;
            }
            SignalPayload::Answer { sdp } => self.handle_answer(&from, link_id, &sdp).await,
            SignalPayload::Candidate { candidate } => {
                self.handle_candidate(&from, link_id, &candidate).await;
            }
            SignalPayload::Depart => {
                if self.peers.contains_key(&from) {
                    info!(target: "session.mesh", peer = %from, "Peer departed");
                    self.drop_peer(&from, PeerState::Closed).await;
                }
            }
        }
    }

    /// Offer a new link to `peer` unless it is us or already known.
    async fn initiate(&mut self, peer: ConnectionId, peer_user: UserId) {
        if peer == self.connection_id || self.peers.contains_key(&peer) {
            return;
        }

        let link_id = new_link_id();
        let connection = match self.open_link(&peer, link_id).await {
            Ok(connection) => connection,
            Err(e) => {
                self.negotiation_failed(&peer, &e);
                return;
            }
        };
        self.peers.insert(
            peer.clone(),
            Peer::discovered(peer_user, link_id, Arc::clone(&connection)),
        );
        metrics::record_link_event(PeerState::Discovered.as_str());

        let sdp = match connection.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.abandon_link(&peer).await;
                self.negotiation_failed(&peer, &e);
                return;
            }
        };
        self.advance(
            &peer,
            PeerState::Negotiating {
                role: NegotiationRole::Offerer,
            },
        );
        debug!(target: "session.mesh", peer = %peer, link_id = link_id, "Offer sent");

        let payload = SignalPayload::Offer {
            sdp,
            restart: false,
        };
        if let Err(e) = self.send_signal(Some(peer.clone()), link_id, payload).await {
            warn!(target: "session.mesh", peer = %peer, error = %e, "Offer not delivered");
            self.drop_peer(&peer, PeerState::Failed).await;
        }
    }

    async fn handle_offer(
        &mut self,
        peer: ConnectionId,
        peer_user: UserId,
        link_id: LinkId,
        sdp: &str,
        restart: bool,
    ) {
        let current = self.peers.get(&peer).map(Peer::view);
        let action = offer_action(&self.connection_id, &peer, current, link_id);

        match action {
            OfferAction::Ignore => {
                let colliding = current.is_some_and(|view| {
                    view.restart_pending
                        || view.state
                            == PeerState::Negotiating {
                                role: NegotiationRole::Offerer,
                            }
                });
                if colliding {
                    metrics::record_glare("impolite");
                    debug!(target: "session.mesh", peer = %peer, restart = restart, "Offer collision, keeping ours");
                }
            }
            OfferAction::Renegotiate | OfferAction::YieldRestart => {
                let Some(connection) = self.peers.get(&peer).map(|p| Arc::clone(&p.connection))
                else {
                    return;
                };
                if action == OfferAction::YieldRestart {
                    metrics::record_glare("polite");
                    debug!(target: "session.mesh", peer = %peer, "Restart collision, yielding");
                    if let Err(e) = connection.rollback().await {
                        self.negotiation_failed(&peer, &e);
                        self.drop_peer(&peer, PeerState::Failed).await;
                        return;
                    }
                    if let Some(p) = self.peers.get_mut(&peer) {
                        p.restart_pending = false;
                    }
                }
                match connection.accept_offer(sdp).await {
                    Ok(answer) => {
                        debug!(target: "session.mesh", peer = %peer, restart = restart, "Renegotiated");
                        self.send_answer(&peer, link_id, answer).await;
                    }
                    Err(e) => {
                        self.negotiation_failed(&peer, &e);
                        self.drop_peer(&peer, PeerState::Failed).await;
                    }
                }
            }
            OfferAction::Accept | OfferAction::Yield | OfferAction::Replace => {
                if action == OfferAction::Yield {
                    metrics::record_glare("polite");
                    debug!(target: "session.mesh", peer = %peer, "Offer collision, yielding");
                }
                if let Some(old) = self.peers.remove(&peer) {
                    old.connection.close().await;
                    if old.remote_stream.is_some() {
                        self.emit(ClientEvent::RemoteStreamRemoved {
                            connection_id: peer.clone(),
                        });
                    }
                }
                self.answer_new_link(peer, peer_user, link_id, sdp).await;
            }
        }
    }

    async fn answer_new_link(
        &mut self,
        peer: ConnectionId,
        peer_user: UserId,
        link_id: LinkId,
        sdp: &str,
    ) {
        let connection = match self.open_link(&peer, link_id).await {
            Ok(connection) => connection,
            Err(e) => {
                self.negotiation_failed(&peer, &e);
                return;
            }
        };
        self.peers.insert(
            peer.clone(),
            Peer::discovered(peer_user, link_id, Arc::clone(&connection)),
        );
        metrics::record_link_event(PeerState::Discovered.as_str());

        let answer = match connection.accept_offer(sdp).await {
            Ok(answer) => answer,
            Err(e) => {
                self.abandon_link(&peer).await;
                self.negotiation_failed(&peer, &e);
                return;
            }
        };
        self.advance(
            &peer,
            PeerState::Negotiating {
                role: NegotiationRole::Answerer,
            },
        );
        self.send_answer(&peer, link_id, answer).await;
    }

    /// Apply an answer only while we have an offer of our own outstanding on
    /// that link.
    async fn handle_answer(&mut self, peer: &ConnectionId, link_id: LinkId, sdp: &str) {
        let Some(p) = self.peers.get_mut(peer).filter(|p| p.link_id == link_id) else {
            debug!(target: "session.mesh", peer = %peer, link_id = link_id, "Answer for unknown link ignored");
            return;
        };
        let awaiting = match p.state {
            PeerState::Negotiating {
                role: NegotiationRole::Offerer,
            } => true,
            PeerState::Connected => p.restart_pending,
            _ => false,
        };
        if !awaiting {
            debug!(target: "session.mesh", peer = %peer, state = p.state.as_str(), "Unexpected answer ignored");
            return;
        }
        p.restart_pending = false;
        let connection = Arc::clone(&p.connection);
        if let Err(e) = connection.accept_answer(sdp).await {
            self.negotiation_failed(peer, &e);
            self.drop_peer(peer, PeerState::Failed).await;
        }
    }

    async fn handle_candidate(&mut self, peer: &ConnectionId, link_id: LinkId, candidate: &IceCandidate) {
        let Some(connection) = self.current_link(peer, link_id) else {
            return;
        };
        if let Err(e) = connection.add_candidate(candidate).await {
            debug!(target: "session.mesh", peer = %peer, error = %e, "Candidate rejected");
        }
    }

    // ------------------------------------------------------------------
    // Link events
    // ------------------------------------------------------------------

    async fn handle_link_event(&mut self, event: LinkEvent) {
        let LinkEvent {
            peer,
            link_id,
            kind,
        } = event;
        let is_current = self
            .peers
            .get(&peer)
            .is_some_and(|p| p.link_id == link_id);
        if !is_current {
            debug!(target: "session.mesh", peer = %peer, link_id = link_id, "Event from stale link ignored");
            return;
        }

        match kind {
            LinkEventKind::Connected => {
                if !self.advance(&peer, PeerState::Connected) {
                    return;
                }
                if let Some(user_id) = self.peers.get(&peer).map(|p| p.user_id.clone()) {
                    info!(target: "session.mesh", peer = %peer, "Link connected");
                    self.emit(ClientEvent::PeerConnected {
                        connection_id: peer,
                        user_id,
                    });
                }
            }
            LinkEventKind::LocalCandidate(candidate) => {
                let payload = SignalPayload::Candidate { candidate };
                if let Err(e) = self.send_signal(Some(peer.clone()), link_id, payload).await {
                    debug!(target: "session.mesh", peer = %peer, error = %e, "Candidate not relayed");
                }
            }
            LinkEventKind::RemoteStream(stream) => {
                if let Some(p) = self.peers.get_mut(&peer) {
                    p.remote_stream = Some(stream.clone());
                }
                self.emit(ClientEvent::RemoteStreamAdded {
                    connection_id: peer,
                    stream,
                });
            }
            LinkEventKind::Failed(reason) => {
                warn!(target: "session.mesh", peer = %peer, reason = %reason, "Link failed");
                self.drop_peer(&peer, PeerState::Failed).await;
            }
            LinkEventKind::Closed => {
                debug!(target: "session.mesh", peer = %peer, "Link closed by peer");
                self.drop_peer(&peer, PeerState::Closed).await;
            }
        }
    }

    /// Restart ICE on every connected link and refresh our descriptor.
    async fn health_tick(&mut self) {
        let connected: Vec<(ConnectionId, LinkId, bool, Arc<dyn PeerConnection>)> = self
            .peers
            .iter()
            .filter(|(_, p)| p.state == PeerState::Connected)
            .map(|(id, p)| (id.clone(), p.link_id, p.restart_pending, Arc::clone(&p.connection)))
            .collect();

        for (peer, link_id, pending, connection) in connected {
            if pending {
                // The previous restart never got an answer.
                if let Err(e) = connection.rollback().await {
                    self.negotiation_failed(&peer, &e);
                    self.drop_peer(&peer, PeerState::Failed).await;
                    continue;
                }
            }
            match connection.restart_ice().await {
                Ok(sdp) => {
                    metrics::record_ice_restart();
                    if let Some(p) = self.peers.get_mut(&peer) {
                        p.restart_pending = true;
                    }
                    let payload = SignalPayload::Offer { sdp, restart: true };
                    if let Err(e) = self.send_signal(Some(peer.clone()), link_id, payload).await {
                        debug!(target: "session.mesh", peer = %peer, error = %e, "Restart offer not delivered");
                    }
                }
                Err(e) => {
                    self.negotiation_failed(&peer, &e);
                    self.drop_peer(&peer, PeerState::Failed).await;
                }
            }
        }

        self.refresh_descriptor().await;
    }

    async fn refresh_descriptor(&mut self) {
        let now = Utc::now();
        match self
            .deps
            .store
            .touch_descriptor(&self.session_id, &self.connection_id, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let descriptor = SignalDescriptor {
                    session_id: self.session_id.clone(),
                    connection_id: self.connection_id.clone(),
                    user_id: self.user_id.clone(),
                    last_seen: now,
                };
                if let Err(e) = self.deps.store.register_descriptor(&descriptor).await {
                    warn!(target: "session.mesh", error = %e, "Descriptor re-registration failed");
                }
            }
            Err(e) => warn!(target: "session.mesh", error = %e, "Descriptor heartbeat failed"),
        }
    }

    // ------------------------------------------------------------------
    // Media source swapping
    // ------------------------------------------------------------------

    async fn start_screen_share(&mut self) -> Result<(), SessionError> {
        if self.screen.is_some() {
            return Err(SessionError::Conflict(
                "Screen share already active".to_string(),
            ));
        }

        let stream = self.deps.devices.capture_display().await?;
        let Some(track) = stream.video_track().cloned() else {
            self.deps.devices.release(&stream).await;
            return Err(SessionError::DeviceDenied(
                "Display capture has no video".to_string(),
            ));
        };
        self.replace_video_everywhere(&track).await;

        let watcher = self.cancel_token.child_token();
        spawn_display_watcher(stream.clone(), watcher.clone(), self.self_sender.clone());
        self.screen = Some(ScreenShare { stream, watcher });
        info!(target: "session.mesh", links = self.peers.len(), "Screen share started");
        Ok(())
    }

    async fn stop_screen_share(&mut self) {
        let Some(screen) = self.screen.take() else {
            return;
        };
        screen.watcher.cancel();

        if let Some(track) = self.camera.as_ref().and_then(|c| c.video_track().cloned()) {
            self.replace_video_everywhere(&track).await;
        }
        self.deps.devices.release(&screen.stream).await;
        self.emit(ClientEvent::ScreenShareEnded);
        info!(target: "session.mesh", "Screen share ended, camera restored");
    }

    async fn replace_video_everywhere(&mut self, track: &crate::media::MediaTrack) {
        let links: Vec<(ConnectionId, Arc<dyn PeerConnection>)> = self
            .peers
            .iter()
            .map(|(id, p)| (id.clone(), Arc::clone(&p.connection)))
            .collect();
        for (peer, connection) in links {
            if let Err(e) = connection.replace_video_track(track).await {
                warn!(target: "session.mesh", peer = %peer, error = %e, "Track replacement failed");
                self.drop_peer(&peer, PeerState::Failed).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Chat, reactions, recording
    // ------------------------------------------------------------------

    async fn send_chat(&mut self, text: &str) -> Result<ChatMessage, SessionError> {
        let message = ChatMessage::compose(self.session_id.clone(), self.user_id.clone(), text)?;
        self.deps.store.append_chat(&message).await?;
        // Persisted already; peers that miss the publish see it in history.
        let _ = self
            .publisher
            .publish(
                &chat_topic(&self.session_id),
                BusMessage::Chat(message.clone()),
            )
            .await;
        Ok(message)
    }

    async fn send_reaction(&mut self, symbol: &str) -> Result<ReactionEvent, SessionError> {
        let reaction =
            ReactionEvent::compose(self.session_id.clone(), self.user_id.clone(), symbol)?;
        self.deps.store.append_reaction(&reaction).await?;
        let _ = self
            .publisher
            .publish(
                &chat_topic(&self.session_id),
                BusMessage::Reaction(reaction.clone()),
            )
            .await;
        Ok(reaction)
    }

    /// Local outgoing media, then every remote view currently displayed.
    fn recording_sources(&self) -> Vec<MediaStream> {
        let mut sources = Vec::with_capacity(self.peers.len() + 1);
        if let Some(screen) = &self.screen {
            sources.push(screen.stream.clone());
        } else if let Some(camera) = &self.camera {
            sources.push(camera.clone());
        }
        let mut remotes: Vec<(&ConnectionId, &MediaStream)> = self
            .peers
            .iter()
            .filter_map(|(id, p)| p.remote_stream.as_ref().map(|s| (id, s)))
            .collect();
        remotes.sort_by(|a, b| a.0.cmp(b.0));
        sources.extend(remotes.into_iter().map(|(_, s)| s.clone()));
        sources
    }

    async fn stop_recording(&mut self) -> Result<Recording, SessionError> {
        let result = self
            .recording
            .stop_capture(&self.session_id, &self.user_id, Utc::now())
            .await;
        match &result {
            Ok(recording) => self.emit(ClientEvent::RecordingSaved(recording.clone())),
            Err(e) => self.emit(ClientEvent::RecordingFailed {
                reason: e.client_message(),
            }),
        }
        result
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Leave the mesh. Safe with partial state and safe to call twice.
    ///
    /// `leave_registry` is false when startup never completed and the caller
    /// handles the participant record.
    async fn teardown(&mut self, leave_registry: bool) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!(
            target: "session.mesh",
            peers = self.peers.len(),
            "Tearing down mesh"
        );

        // Stop every timer and subscription before touching media.
        self.bus.unsubscribe_all();
        if let Some(screen) = &self.screen {
            screen.watcher.cancel();
        }

        if self.recording.is_active() {
            match self.stop_recording().await {
                Ok(recording) => {
                    info!(target: "session.mesh", filename = %recording.filename, "Recording saved on leave");
                }
                Err(e) => warn!(target: "session.mesh", error = %e, "Recording lost on leave"),
            }
        }

        if let Some(screen) = self.screen.take() {
            self.deps.devices.release(&screen.stream).await;
        }
        if let Some(camera) = self.camera.take() {
            self.deps.devices.release(&camera).await;
        }

        for (_, peer) in self.peers.drain() {
            peer.connection.close().await;
        }

        if let Err(e) = self
            .deps
            .store
            .deregister_descriptor(&self.session_id, &self.connection_id)
            .await
        {
            warn!(target: "session.mesh", error = %e, "Descriptor deregistration failed");
        }

        if leave_registry {
            if let Err(e) = self
                .deps
                .registry
                .leave(&self.session_id, &self.user_id)
                .await
            {
                warn!(target: "session.mesh", error = %e, "Participant record not removed");
            }
        }

        if let Err(e) = self.send_signal(None, 0, SignalPayload::Depart).await {
            debug!(target: "session.mesh", error = %e, "Depart not published");
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn open_link(
        &self,
        peer: &ConnectionId,
        link_id: LinkId,
    ) -> Result<Arc<dyn PeerConnection>, SessionError> {
        let Some(camera) = &self.camera else {
            return Err(SessionError::Internal("local media released".to_string()));
        };
        let connection = self
            .deps
            .peers
            .create(peer, link_id, camera, self.link_tx.clone())
            .await?;
        // New links carry whatever video is currently going out.
        if let Some(track) = self.screen.as_ref().and_then(|s| s.stream.video_track()) {
            if let Err(e) = connection.replace_video_track(track).await {
                connection.close().await;
                return Err(e);
            }
        }
        Ok(connection)
    }

    /// Move `peer` to `next` when that transition is legal.
    fn advance(&mut self, peer: &ConnectionId, next: PeerState) -> bool {
        let Some(p) = self.peers.get_mut(peer) else {
            return false;
        };
        if !p.state.can_become(next) {
            debug!(target: "session.mesh", peer = %peer, from = p.state.as_str(), to = next.as_str(), "State change refused");
            return false;
        }
        p.state = next;
        metrics::record_link_event(next.as_str());
        true
    }

    /// Forget a link that never got far enough to be reported.
    async fn abandon_link(&mut self, peer: &ConnectionId) {
        if let Some(p) = self.peers.remove(peer) {
            p.connection.close().await;
        }
    }

    fn current_link(&self, peer: &ConnectionId, link_id: LinkId) -> Option<Arc<dyn PeerConnection>> {
        self.peers
            .get(peer)
            .filter(|p| p.link_id == link_id)
            .map(|p| Arc::clone(&p.connection))
    }

    /// Remove one peer's link and view. Other links are untouched.
    async fn drop_peer(&mut self, peer: &ConnectionId, outcome: PeerState) {
        let Some(removed) = self.peers.remove(peer) else {
            return;
        };
        removed.connection.close().await;
        metrics::record_link_event(outcome.as_str());
        if removed.remote_stream.is_some() {
            self.emit(ClientEvent::RemoteStreamRemoved {
                connection_id: peer.clone(),
            });
        }
        self.emit(ClientEvent::PeerLeft {
            connection_id: peer.clone(),
            user_id: removed.user_id,
        });
    }

    fn negotiation_failed(&self, peer: &ConnectionId, error: &SessionError) {
        metrics::record_link_event("failed");
        warn!(
            target: "session.mesh",
            peer = %peer,
            error = %error,
            "Negotiation failed"
        );
    }

    async fn send_answer(&mut self, peer: &ConnectionId, link_id: LinkId, sdp: String) {
        let payload = SignalPayload::Answer { sdp };
        if let Err(e) = self.send_signal(Some(peer.clone()), link_id, payload).await {
            warn!(target: "session.mesh", peer = %peer, error = %e, "Answer not delivered");
        }
    }

    async fn send_signal(
        &self,
        to: Option<ConnectionId>,
        link_id: LinkId,
        payload: SignalPayload,
    ) -> Result<(), SessionError> {
        let message = SignalMessage {
            from: self.connection_id.clone(),
            from_user: self.user_id.clone(),
            to,
            link_id,
            payload,
        };
        self.publisher
            .publish(&signal_topic(&self.session_id), BusMessage::Signal(message))
            .await
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(target: "session.mesh", error = %e, "Client event dropped");
        }
    }

    fn snapshot(&self) -> MeshSnapshot {
        let mut peers: Vec<PeerView> = self
            .peers
            .iter()
            .map(|(id, p)| PeerView {
                connection_id: id.clone(),
                user_id: p.user_id.clone(),
                state: p.state,
                has_remote_stream: p.remote_stream.is_some(),
            })
            .collect();
        peers.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        MeshSnapshot {
            connection_id: self.connection_id.clone(),
            peers,
            sharing_screen: self.screen.is_some(),
            recording: self.recording.is_active(),
        }
    }
}

fn new_link_id() -> LinkId {
    Uuid::new_v4().as_u64_pair().0
}

/// Report the end of a display capture back to the actor.
fn spawn_display_watcher(
    stream: MediaStream,
    cancel_token: CancellationToken,
    actor: mpsc::WeakSender<MeshMessage>,
) {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel_token.cancelled() => {}
            () = stream.ended() => {
                if let Some(sender) = actor.upgrade() {
                    let _ = sender
                        .send(MeshMessage::DisplayEnded { stream_id: stream.id.clone() })
                        .await;
                }
            }
        }
    });
}
