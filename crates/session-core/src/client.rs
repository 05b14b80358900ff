//! Client join flow.
//!
//! Ties identity, admission, local media and the mesh together: a user is
//! admitted (waiting for the host if needed), captures camera and
//! microphone, then starts a mesh actor.

use crate::bus::{admission_topic, BusMessage, SignalingBus};
use crate::errors::SessionError;
use crate::identity::IdentityProvider;
use crate::mesh::{MeshActor, MeshDeps, MeshSession};
use crate::models::ParticipantStatus;
use common::types::{SessionId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const ADMISSION_CHANNEL_BUFFER: usize = 64;

/// How a join attempt ended.
pub enum JoinOutcome {
    /// Admitted and connected to the mesh.
    Joined(MeshSession),
    /// The host turned the request down.
    Denied,
    /// The caller cancelled while waiting for the host.
    Cancelled,
}

impl std::fmt::Debug for JoinOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinOutcome::Joined(session) => f
                .debug_tuple("Joined")
                .field(session.handle.connection_id())
                .finish(),
            JoinOutcome::Denied => f.write_str("Denied"),
            JoinOutcome::Cancelled => f.write_str("Cancelled"),
        }
    }
}

pub struct SessionClient {
    identity: Arc<dyn IdentityProvider>,
    deps: MeshDeps,
}

impl SessionClient {
    pub fn new(identity: Arc<dyn IdentityProvider>, deps: MeshDeps) -> Self {
        Self { identity, deps }
    }

    /// Join `session`, waiting for the host's decision if required.
    ///
    /// On every failure after the join request was registered, the
    /// participant record is removed again so a retry starts clean.
    #[instrument(skip_all, name = "session.client.join", fields(session_id = %session))]
    pub async fn join(
        &self,
        session: &SessionId,
        passcode: Option<&str>,
        cancel_token: CancellationToken,
    ) -> Result<JoinOutcome, SessionError> {
        let user = self.identity.current_identity()?;
        let registry = &self.deps.registry;

        registry.verify_passcode(session, &user, passcode).await?;
        let mut status = registry.request_join(session, &user).await?;

        if status == ParticipantStatus::Pending {
            info!(target: "session.client", user_id = %user, "Waiting for host approval");
            match self
                .wait_for_decision(session, &user, &cancel_token)
                .await?
            {
                Some(decided) => status = decided,
                None => {
                    info!(target: "session.client", "Join cancelled while waiting");
                    self.withdraw(session, &user).await;
                    return Ok(JoinOutcome::Cancelled);
                }
            }
        }

        if status == ParticipantStatus::Denied {
            info!(target: "session.client", user_id = %user, "Join denied by host");
            return Ok(JoinOutcome::Denied);
        }

        let local = match self.deps.devices.capture_user_media().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(target: "session.client", error = %e, "Local media unavailable");
                self.withdraw(session, &user).await;
                return Err(e);
            }
        };

        match MeshActor::start(
            self.deps.clone(),
            session.clone(),
            user.clone(),
            local.clone(),
            cancel_token,
        )
        .await
        {
            Ok(mesh) => Ok(JoinOutcome::Joined(mesh)),
            Err(e) => {
                self.deps.devices.release(&local).await;
                self.withdraw(session, &user).await;
                Err(e)
            }
        }
    }

    /// Wait until the user's record leaves `pending`.
    ///
    /// Events are a hint; the store is the source of truth, so every wake-up
    /// re-reads the status. Returns `None` on cancellation.
    async fn wait_for_decision(
        &self,
        session: &SessionId,
        user: &UserId,
        cancel_token: &CancellationToken,
    ) -> Result<Option<ParticipantStatus>, SessionError> {
        let mut bus = SignalingBus::new(
            Arc::clone(&self.deps.transport),
            self.deps.config.backoff,
            cancel_token.child_token(),
        );
        let (tx, mut rx) = mpsc::channel(ADMISSION_CHANNEL_BUFFER);
        bus.subscribe(&admission_topic(session), tx).await;

        // A decision made before the subscription went live has no event.
        if let Some(status) = self.settled_status(session, user).await? {
            return Ok(Some(status));
        }

        let period = self.deps.config.admission_recheck;
        let mut recheck = interval_at(Instant::now() + period, period);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => return Ok(None),

                _ = recheck.tick() => {
                    debug!(target: "session.client", "Rechecking admission status");
                }

                Some(envelope) = rx.recv() => {
                    let concerns_us = matches!(
                        &envelope.message,
                        BusMessage::Admission(event) if event.user_id() == user
                    );
                    if !concerns_us {
                        continue;
                    }
                }
            }

            if let Some(status) = self.settled_status(session, user).await? {
                return Ok(Some(status));
            }
        }
    }

    /// `Some` once the status is terminal. A missing record means the
    /// request was withdrawn elsewhere.
    async fn settled_status(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<ParticipantStatus>, SessionError> {
        match self.deps.registry.status(session, user).await? {
            Some(status) if status.is_terminal() => Ok(Some(status)),
            Some(_) => Ok(None),
            None => Err(SessionError::NotFound(
                "Join request no longer exists".to_string(),
            )),
        }
    }

    async fn withdraw(&self, session: &SessionId, user: &UserId) {
        if let Err(e) = self.deps.registry.leave(session, user).await {
            warn!(target: "session.client", error = %e, "Join request not withdrawn");
        }
    }
}
