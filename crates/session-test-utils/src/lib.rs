//! # Session Test Utilities
//!
//! Mocks and fixtures for exercising `session-core` without real devices,
//! a real peer-connection stack, object storage or Redis.
//!
//! ## Modules
//!
//! - `mock_media` - scripted media devices and peer connections
//! - `mock_recording` - in-memory mixer and object storage
//! - `flaky_transport` - a bus transport whose subscriptions can be broken and whose publishes can be held back
//! - `fixtures` - a shared store and bus with per-client dependency kits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let world = TestWorld::new();
//!     let session = world.create_session("standup", "host").await;
//!
//!     let host = world.client_kit();
//!     let mesh = MeshActor::start(host.deps.clone(), session, "host".into(),
//!         MediaStream::camera(), CancellationToken::new()).await.unwrap();
//!     // ...
//! }
//! ```

pub mod fixtures;
pub mod flaky_transport;
pub mod mock_media;
pub mod mock_recording;

// Re-export commonly used items
pub use fixtures::*;
pub use flaky_transport::*;
pub use mock_media::*;
pub use mock_recording::*;
