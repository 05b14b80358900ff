//! Parley session coordination library.
//!
//! Everything a client needs to take part in a small meeting without a
//! media server:
//!
//! - Admission: the host approves or denies each user waiting to join
//! - Presence & signaling bus: per-session pub/sub for admission events,
//!   peer discovery, offer/answer relay, chat and reactions
//! - Mesh connection manager: one direct link per pair of clients, kept
//!   healthy with periodic ICE restarts
//! - Recording: mix what a client sees into one artifact and upload it
//!
//! # Architecture
//!
//! ```text
//! SessionClient (one per user per session)
//! ├── AdmissionRegistry      (shared store + admission topic)
//! └── MeshActor              (owns all per-client mesh state)
//!     ├── SignalingBus       (signal + chat subscriptions, auto-resubscribe)
//!     ├── PeerConnection × N (one per remote client)
//!     └── RecordingPipeline  (at most one capture)
//! ```
//!
//! Shared state lives behind the [`store::Store`] traits; the bus behind
//! [`bus::BusTransport`]. In-memory implementations of both ship with the
//! crate, Redis pub/sub backs the bus in production and the service crate
//! provides a PostgreSQL store.
//!
//! # Modules
//!
//! - [`admission`] - participant state machine and host decisions
//! - [`bus`] - topics, envelopes, publishing and resilient subscriptions
//! - [`client`] - the join flow tying admission, media and mesh together
//! - [`mesh`] - per-client mesh actor
//! - [`recording`] - mixing, upload and bookkeeping
//! - [`store`] - persistence seams

pub mod admission;
pub mod bus;
pub mod client;
pub mod config;
pub mod errors;
pub mod identity;
pub mod media;
pub mod mesh;
pub mod models;
pub mod observability;
pub mod recording;
pub mod store;
pub mod waiting_room;
