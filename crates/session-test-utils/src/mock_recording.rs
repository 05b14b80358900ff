//! In-memory mixer and object storage.

use async_trait::async_trait;
use bytes::Bytes;
use session_core::errors::SessionError;
use session_core::media::MediaStream;
use session_core::recording::{MediaMixer, MixedCapture, ObjectStorage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Mixer whose artifact lists the ids of the mixed streams.
#[derive(Debug, Default)]
pub struct MockMixer {
    started: Mutex<Vec<Vec<String>>>,
}

impl MockMixer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source stream ids of every capture started, oldest first.
    pub fn captures(&self) -> Vec<Vec<String>> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaMixer for MockMixer {
    async fn start(&self, sources: &[MediaStream]) -> Result<Box<dyn MixedCapture>, SessionError> {
        let ids: Vec<String> = sources.iter().map(|s| s.id.clone()).collect();
        self.started.lock().unwrap().push(ids.clone());
        Ok(Box::new(MockCapture { ids }))
    }
}

struct MockCapture {
    ids: Vec<String>,
}

#[async_trait]
impl MixedCapture for MockCapture {
    async fn finalize(&mut self) -> Result<Bytes, SessionError> {
        Ok(Bytes::from(format!("webm:{}", self.ids.join(","))))
    }
}

/// Object storage that keeps uploads in memory.
#[derive(Debug, Default)]
pub struct MockStorage {
    fail: AtomicBool,
    objects: Mutex<Vec<(String, Bytes)>>,
}

impl MockStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload fails while set.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stored objects, in upload order.
    pub fn objects(&self) -> Vec<(String, Bytes)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn put(&self, name: &str, data: Bytes) -> Result<String, SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::UploadFailed(
                "storage unavailable".to_string(),
            ));
        }
        self.objects
            .lock()
            .unwrap()
            .push((name.to_string(), data));
        Ok(format!("mock://recordings/{name}"))
    }
}

