//! Mesh connection manager.
//!
//! Each joined client runs one [`MeshActor`] that keeps a direct media link
//! to every other client in the session. Discovery rides the signal topic
//! and the descriptor table; offers, answers and candidates are relayed over
//! the same topic, addressed by connection id.

mod actor;
mod messages;
mod peer;

pub use actor::{MeshActor, MeshActorHandle, MeshDeps, MeshSession};
pub use messages::{ClientEvent, MeshMessage, MeshSnapshot, PeerView};
pub use peer::{is_polite, offer_action, LinkView, NegotiationRole, OfferAction, PeerState};
