//! Admission registry.
//!
//! Owns the participant state machine for each session. Non-host users start
//! `pending`; only the host can move them to `approved` or `denied`, and only
//! once. Every mutation is announced on the session's admission topic.

use crate::bus::{admission_topic, AdmissionEvent, BusMessage, BusPublisher};
use crate::errors::SessionError;
use crate::models::{ParticipantRecord, ParticipantStatus, Session, Verdict};
use crate::observability::metrics;
use crate::store::Store;
use common::secret::ExposeSecret;
use common::types::{SessionId, UserId};
use ring::hmac;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a host decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// False when the record was already resolved and nothing changed.
    pub applied: bool,
    pub status: ParticipantStatus,
}

#[derive(Clone)]
pub struct AdmissionRegistry {
    store: Arc<dyn Store>,
    publisher: Option<BusPublisher>,
}

impl AdmissionRegistry {
    /// A registry without a publisher mutates state silently; used where no
    /// one listens (tests, batch tooling).
    pub fn new(store: Arc<dyn Store>, publisher: Option<BusPublisher>) -> Self {
        Self { store, publisher }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Load a session or fail with `NotFound`.
    pub async fn session(&self, session: &SessionId) -> Result<Session, SessionError> {
        self.store
            .get_session(session)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("Session {session} not found")))
    }

    /// Register intent to join. Idempotent: repeated calls return the
    /// existing status. The host is approved without a record.
    #[instrument(skip_all, name = "session.admission.request_join", fields(session_id = %session, user_id = %user))]
    pub async fn request_join(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<ParticipantStatus, SessionError> {
        let info = self.session(session).await?;
        if info.is_host(user) {
            debug!(target: "session.admission", "Host joins without admission");
            metrics::record_join_request(ParticipantStatus::Approved.as_str());
            return Ok(ParticipantStatus::Approved);
        }

        let status = match self.store.insert_pending_if_absent(session, user).await? {
            Some(record) => {
                let status = record.status;
                if status == ParticipantStatus::Pending {
                    self.announce(session, AdmissionEvent::Requested { record })
                        .await;
                }
                status
            }
            // Only the host has no record, and the host returned above.
            None => {
                return Err(SessionError::Internal(
                    "No participant record after join request".to_string(),
                ));
            }
        };

        metrics::record_join_request(status.as_str());
        info!(target: "session.admission", status = %status, "Join requested");
        Ok(status)
    }

    /// Check a supplied passcode. Hosts and passcode-less sessions always
    /// pass. Comparison runs in constant time.
    #[instrument(skip_all, name = "session.admission.verify_passcode", fields(session_id = %session))]
    pub async fn verify_passcode(
        &self,
        session: &SessionId,
        user: &UserId,
        supplied: Option<&str>,
    ) -> Result<(), SessionError> {
        let info = self.session(session).await?;
        let Some(expected) = info.passcode.as_ref() else {
            return Ok(());
        };
        if info.is_host(user) {
            return Ok(());
        }

        let key = hmac::Key::new(hmac::HMAC_SHA256, session.as_str().as_bytes());
        let tag = hmac::sign(&key, expected.expose_secret().as_bytes());
        let supplied = supplied.unwrap_or_default();
        hmac::verify(&key, supplied.as_bytes(), tag.as_ref()).map_err(|_| {
            warn!(target: "session.admission", "Passcode mismatch");
            SessionError::Unauthorized("Incorrect passcode".to_string())
        })
    }

    /// Apply a host verdict to a pending participant.
    ///
    /// A second decision on the same record is a no-op that reports the
    /// status set by the first.
    #[instrument(skip_all, name = "session.admission.decide", fields(session_id = %session, user_id = %user))]
    pub async fn decide(
        &self,
        session: &SessionId,
        user: &UserId,
        verdict: Verdict,
        acting_user: &UserId,
    ) -> Result<Decision, SessionError> {
        self.require_host(session, acting_user).await?;

        let status = ParticipantStatus::from(verdict);
        if let Some(record) = self.store.resolve_pending(session, user, status).await? {
            metrics::record_decision(status.as_str(), true);
            info!(target: "session.admission", status = %status, "Participant resolved");
            self.announce(session, AdmissionEvent::Resolved { record })
                .await;
            return Ok(Decision {
                applied: true,
                status,
            });
        }

        match self.store.get_participant(session, user).await? {
            Some(existing) => {
                metrics::record_decision(status.as_str(), false);
                debug!(
                    target: "session.admission",
                    current = %existing.status,
                    "Decision ignored, participant already resolved"
                );
                Ok(Decision {
                    applied: false,
                    status: existing.status,
                })
            }
            None => Err(SessionError::NotFound(format!(
                "Participant {user} not found"
            ))),
        }
    }

    /// Pending participants, oldest request first. Host only.
    #[instrument(skip_all, name = "session.admission.list_pending", fields(session_id = %session))]
    pub async fn list_pending(
        &self,
        session: &SessionId,
        acting_user: &UserId,
    ) -> Result<Vec<ParticipantRecord>, SessionError> {
        self.require_host(session, acting_user).await?;
        self.store
            .list_by_status(session, ParticipantStatus::Pending)
            .await
    }

    /// Remove the participant's record so a later join starts over.
    /// Succeeds when no record exists.
    #[instrument(skip_all, name = "session.admission.leave", fields(session_id = %session, user_id = %user))]
    pub async fn leave(&self, session: &SessionId, user: &UserId) -> Result<(), SessionError> {
        if self.store.delete_participant(session, user).await? {
            info!(target: "session.admission", "Participant record removed");
            self.announce(
                session,
                AdmissionEvent::Removed {
                    session_id: session.clone(),
                    user_id: user.clone(),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Current status. The host reads as `approved`; `None` means no record.
    pub async fn status(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantStatus>, SessionError> {
        let info = self.session(session).await?;
        if info.is_host(user) {
            return Ok(Some(ParticipantStatus::Approved));
        }
        Ok(self
            .store
            .get_participant(session, user)
            .await?
            .map(|r| r.status))
    }

    /// Host or approved participant.
    pub async fn is_member(&self, session: &SessionId, user: &UserId) -> Result<bool, SessionError> {
        Ok(self.status(session, user).await? == Some(ParticipantStatus::Approved))
    }

    async fn require_host(
        &self,
        session: &SessionId,
        acting_user: &UserId,
    ) -> Result<Session, SessionError> {
        let info = self.session(session).await?;
        if !info.is_host(acting_user) {
            warn!(target: "session.admission", acting_user = %acting_user, "Host-only operation refused");
            return Err(SessionError::Unauthorized(
                "Only the session host may do this".to_string(),
            ));
        }
        Ok(info)
    }

    async fn announce(&self, session: &SessionId, event: AdmissionEvent) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        // Delivery is best effort: the mutation already committed.
        if let Err(e) = publisher
            .publish(&admission_topic(session), BusMessage::Admission(event))
            .await
        {
            warn!(target: "session.admission", error = %e, "Admission event not published");
        }
    }
}
