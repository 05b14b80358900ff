//! Shared backends plus per-client dependency kits.
//!
//! A `TestWorld` is one deployment: one store and one bus. Each simulated
//! client gets its own `ClientKit` with its own devices, peer stack,
//! mixer and storage, all wired to the world's shared backends.

use common::types::SessionId;
use session_core::admission::AdmissionRegistry;
use session_core::bus::{BusPublisher, BusTransport, MemoryTransport};
use session_core::config::MeshConfig;
use session_core::mesh::{ClientEvent, MeshDeps};
use session_core::models::NewSession;
use session_core::store::{MemoryStore, SessionRepository};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::mock_media::{MockMediaDevices, MockPeerFactory};
use crate::mock_recording::{MockMixer, MockStorage};

pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<dyn BusTransport>,
    pub config: MeshConfig,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(Arc::new(MemoryTransport::new()))
    }

    #[must_use]
    pub fn with_transport(transport: Arc<dyn BusTransport>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            transport,
            config: MeshConfig::default(),
        }
    }

    /// A registry that announces on the world's bus.
    pub fn registry(&self) -> AdmissionRegistry {
        AdmissionRegistry::new(
            self.store.clone(),
            Some(BusPublisher::new(Arc::clone(&self.transport), "registry")),
        )
    }

    pub async fn create_session(&self, id: &str, host: &str) -> SessionId {
        self.store
            .create_session(NewSession::new(id, host))
            .await
            .unwrap()
            .id
    }

    pub async fn create_session_with_passcode(
        &self,
        id: &str,
        host: &str,
        passcode: &str,
    ) -> SessionId {
        self.store
            .create_session(NewSession::new(id, host).with_passcode(passcode))
            .await
            .unwrap()
            .id
    }

    /// Fresh mocks for one client.
    pub fn client_kit(&self) -> ClientKit {
        let devices = Arc::new(MockMediaDevices::new());
        self.kit_with_devices(devices)
    }

    pub fn kit_with_devices(&self, devices: Arc<MockMediaDevices>) -> ClientKit {
        let peers = Arc::new(MockPeerFactory::new());
        let mixer = Arc::new(MockMixer::new());
        let storage = Arc::new(MockStorage::new());
        let deps = MeshDeps {
            store: self.store.clone(),
            registry: self.registry(),
            transport: Arc::clone(&self.transport),
            devices: devices.clone(),
            peers: peers.clone(),
            mixer: mixer.clone(),
            storage: storage.clone(),
            config: self.config.clone(),
        };
        ClientKit {
            deps,
            devices,
            peers,
            mixer,
            storage,
        }
    }
}

/// Dependencies for one client, with typed access to its mocks.
pub struct ClientKit {
    pub deps: MeshDeps,
    pub devices: Arc<MockMediaDevices>,
    pub peers: Arc<MockPeerFactory>,
    pub mixer: Arc<MockMixer>,
    pub storage: Arc<MockStorage>,
}

/// Poll `check` every 10ms until it holds. Panics after 5s.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Receive client events until one matches `matches`. Panics after 5s.
pub async fn wait_for_event<F>(events: &mut mpsc::Receiver<ClientEvent>, mut matches: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if matches(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .expect("timed out waiting for client event");
    found.expect("client event stream closed")
}
