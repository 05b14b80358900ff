//! Commands accepted by the mesh actor and events it reports.

use super::peer::PeerState;
use crate::errors::SessionError;
use crate::media::MediaStream;
use crate::models::{ChatMessage, ReactionEvent, Recording};
use common::types::{ConnectionId, UserId};
use tokio::sync::oneshot;

/// Messages sent to a `MeshActor`.
#[derive(Debug)]
pub enum MeshMessage {
    StartScreenShare {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    StopScreenShare {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    SendChat {
        text: String,
        respond_to: oneshot::Sender<Result<ChatMessage, SessionError>>,
    },
    SendReaction {
        symbol: String,
        respond_to: oneshot::Sender<Result<ReactionEvent, SessionError>>,
    },
    StartRecording {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    StopRecording {
        respond_to: oneshot::Sender<Result<Recording, SessionError>>,
    },
    GetState {
        respond_to: oneshot::Sender<MeshSnapshot>,
    },
    Leave {
        respond_to: oneshot::Sender<()>,
    },
    /// Internal: the display stream with this id stopped.
    DisplayEnded { stream_id: String },
}

/// Notifications for the embedding application.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    PeerConnected {
        connection_id: ConnectionId,
        user_id: UserId,
    },
    PeerLeft {
        connection_id: ConnectionId,
        user_id: UserId,
    },
    RemoteStreamAdded {
        connection_id: ConnectionId,
        stream: MediaStream,
    },
    RemoteStreamRemoved {
        connection_id: ConnectionId,
    },
    ChatReceived(ChatMessage),
    ReactionReceived(ReactionEvent),
    /// Outgoing video is back on the camera.
    ScreenShareEnded,
    RecordingSaved(Recording),
    RecordingFailed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerView {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub state: PeerState,
    pub has_remote_stream: bool,
}

/// Point-in-time view of one client's mesh.
#[derive(Debug, Clone)]
pub struct MeshSnapshot {
    pub connection_id: ConnectionId,
    /// Sorted by connection id.
    pub peers: Vec<PeerView>,
    pub sharing_screen: bool,
    pub recording: bool,
}

impl MeshSnapshot {
    /// Peers whose link is up.
    #[must_use]
    pub fn connected_peers(&self) -> Vec<&ConnectionId> {
        self.peers
            .iter()
            .filter(|p| p.state == PeerState::Connected)
            .map(|p| &p.connection_id)
            .collect()
    }
}
