use super::{MediaMixer, MixedCapture, ObjectStorage};
use crate::errors::SessionError;
use crate::media::MediaStream;
use crate::models::Recording;
use crate::observability::metrics;
use crate::store::Store;
use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Deterministic artifact name: session id plus the stop time to the
/// millisecond, e.g. `standup-20240301T101500123Z.webm`.
///
/// Characters outside `[A-Za-z0-9_-]` in the session id become `_`.
#[must_use]
pub fn artifact_name(session: &SessionId, stopped_at: DateTime<Utc>) -> String {
    let safe: String = session
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}-{}.webm", stopped_at.format("%Y%m%dT%H%M%S%3fZ"))
}

struct ActiveCapture {
    capture: Box<dyn MixedCapture>,
    started_at: DateTime<Utc>,
    source_count: usize,
}

/// At most one capture at a time per client.
pub struct RecordingPipeline {
    mixer: Arc<dyn MediaMixer>,
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn Store>,
    active: Option<ActiveCapture>,
}

impl RecordingPipeline {
    pub fn new(
        mixer: Arc<dyn MediaMixer>,
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            mixer,
            storage,
            store,
            active: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// When the running capture started, if any.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    /// Start mixing `sources` (local media first, then each displayed
    /// remote view). Fails with `Conflict` if a capture is running.
    #[instrument(skip_all, name = "session.recording.start", fields(sources = sources.len()))]
    pub async fn start_capture(&mut self, sources: &[MediaStream]) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::Conflict(
                "A recording is already in progress".to_string(),
            ));
        }

        let capture = self.mixer.start(sources).await?;
        self.active = Some(ActiveCapture {
            capture,
            started_at: Utc::now(),
            source_count: sources.len(),
        });
        info!(target: "session.recording", sources = sources.len(), "Capture started");
        Ok(())
    }

    /// Finalize, upload and register the running capture.
    ///
    /// Capture state is cleared before anything can fail, so a failed upload
    /// leaves the pipeline idle and nothing is retried.
    #[instrument(skip_all, name = "session.recording.stop", fields(session_id = %session))]
    pub async fn stop_capture(
        &mut self,
        session: &SessionId,
        uploader: &UserId,
        stopped_at: DateTime<Utc>,
    ) -> Result<Recording, SessionError> {
        let Some(mut active) = self.active.take() else {
            return Err(SessionError::Conflict(
                "No recording is in progress".to_string(),
            ));
        };

        let bytes = active.capture.finalize().await?;
        let filename = artifact_name(session, stopped_at);

        let upload_started = Instant::now();
        let path = match self.storage.put(&filename, bytes).await {
            Ok(path) => {
                metrics::record_upload("success", upload_started.elapsed());
                path
            }
            Err(e) => {
                metrics::record_upload("error", upload_started.elapsed());
                warn!(target: "session.recording", filename = %filename, error = %e, "Upload failed");
                return Err(match e {
                    SessionError::UploadFailed(_) => e,
                    other => SessionError::UploadFailed(other.to_string()),
                });
            }
        };

        let recording = Recording {
            id: Uuid::new_v4(),
            session_id: session.clone(),
            uploader: uploader.clone(),
            filename,
            path,
            created_at: stopped_at,
        };
        self.store.insert_recording(&recording).await?;

        info!(
            target: "session.recording",
            filename = %recording.filename,
            sources = active.source_count,
            duration_secs = (stopped_at - active.started_at).num_seconds(),
            "Recording saved"
        );
        Ok(recording)
    }
}
