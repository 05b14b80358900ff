use crate::errors::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Durable blob storage for recording artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `name` and return the storage path.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<String, SessionError>;
}

/// Stores artifacts as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    #[instrument(skip_all, name = "session.recording.fs_put", fields(name = %name, size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Bytes) -> Result<String, SessionError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SessionError::BadRequest(format!(
                "invalid artifact name '{name}'"
            )));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SessionError::UploadFailed(format!("create {:?}: {e}", self.root)))?;
        let path = self.root.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| SessionError::UploadFailed(format!("write {path:?}: {e}")))?;

        debug!(target: "session.recording", path = ?path, "Artifact written");
        Ok(path.to_string_lossy().into_owned())
    }
}
