//! Join flow tests: identity, passcode, waiting room, media and mesh start.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::{SessionId, UserId};
use session_core::client::{JoinOutcome, SessionClient};
use session_core::errors::SessionError;
use session_core::identity::StaticIdentity;
use session_core::models::{ParticipantStatus, Verdict};
use session_core::waiting_room::WaitingRoom;
use session_test_utils::{eventually, ClientKit, MockMediaDevices, TestWorld};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn client(kit: &ClientKit, user: &str) -> SessionClient {
    SessionClient::new(Arc::new(StaticIdentity::signed_in(user)), kit.deps.clone())
}

async fn pending_count(world: &TestWorld, session: &SessionId) -> usize {
    world
        .registry()
        .list_pending(session, &UserId::from("host"))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_host_joins_immediately() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let kit = world.client_kit();

    let outcome = client(&kit, "host")
        .join(&session, None, CancellationToken::new())
        .await
        .unwrap();

    let JoinOutcome::Joined(mesh) = outcome else {
        panic!("host should join");
    };
    assert!(mesh.handle.state().await.unwrap().peers.is_empty());
    assert_eq!(world.store.participant_count(&session).await, 0);
}

#[tokio::test]
async fn test_anonymous_user_is_unauthorized() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let kit = world.client_kit();
    let client = SessionClient::new(Arc::new(StaticIdentity::anonymous()), kit.deps.clone());

    let err = client
        .join(&session, None, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Unauthorized(_)));
    assert_eq!(world.store.participant_count(&session).await, 0);
}

#[tokio::test]
async fn test_wrong_passcode_is_rejected_before_request() {
    let world = TestWorld::new();
    let session = world
        .create_session_with_passcode("standup", "host", "1234")
        .await;
    let kit = world.client_kit();

    let err = client(&kit, "guest")
        .join(&session, Some("0000"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Unauthorized(_)));
    assert_eq!(world.store.participant_count(&session).await, 0);
}

#[tokio::test]
async fn test_guest_waits_until_host_approves() {
    let world = TestWorld::new();
    let session = world
        .create_session_with_passcode("standup", "host", "1234")
        .await;
    let host_kit = world.client_kit();
    let JoinOutcome::Joined(host) = client(&host_kit, "host")
        .join(&session, None, CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("host should join");
    };

    let guest_kit = world.client_kit();
    let guest_client = client(&guest_kit, "guest");
    let session_clone = session.clone();
    let join = tokio::spawn(async move {
        guest_client
            .join(&session_clone, Some("1234"), CancellationToken::new())
            .await
    });

    eventually("guest waiting", || async {
        pending_count(&world, &session).await == 1
    })
    .await;
    assert!(!join.is_finished());

    world
        .registry()
        .decide(
            &session,
            &UserId::from("guest"),
            Verdict::Approved,
            &UserId::from("host"),
        )
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let JoinOutcome::Joined(guest) = outcome else {
        panic!("guest should join");
    };

    eventually("mesh formed", || async {
        host.handle.state().await.unwrap().connected_peers().len() == 1
            && guest.handle.state().await.unwrap().connected_peers().len() == 1
    })
    .await;
}

#[tokio::test]
async fn test_denied_guest_gets_denied_outcome() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let kit = world.client_kit();
    let guest_client = client(&kit, "guest");
    let session_clone = session.clone();
    let join = tokio::spawn(async move {
        guest_client
            .join(&session_clone, None, CancellationToken::new())
            .await
    });

    eventually("guest waiting", || async {
        pending_count(&world, &session).await == 1
    })
    .await;
    world
        .registry()
        .decide(
            &session,
            &UserId::from("guest"),
            Verdict::Denied,
            &UserId::from("host"),
        )
        .await
        .unwrap();

    let outcome = join.await.unwrap().unwrap();
    assert!(matches!(outcome, JoinOutcome::Denied));
    assert_eq!(kit.devices.live_streams(), 0, "no media acquired");
}

#[tokio::test]
async fn test_already_approved_user_joins_without_waiting() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let registry = world.registry();
    let guest = UserId::from("guest");

    // Approved before the client ever asks.
    registry.request_join(&session, &guest).await.unwrap();
    registry
        .decide(&session, &guest, Verdict::Approved, &UserId::from("host"))
        .await
        .unwrap();

    let kit = world.client_kit();
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        client(&kit, "guest").join(&session, None, CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(outcome, JoinOutcome::Joined(_)));
}

#[tokio::test]
async fn test_cancel_while_waiting_removes_request() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let kit = world.client_kit();
    let cancel = CancellationToken::new();
    let guest_client = client(&kit, "guest");
    let (session_clone, cancel_clone) = (session.clone(), cancel.clone());
    let join = tokio::spawn(async move {
        guest_client.join(&session_clone, None, cancel_clone).await
    });

    eventually("guest waiting", || async {
        pending_count(&world, &session).await == 1
    })
    .await;
    cancel.cancel();

    let outcome = join.await.unwrap().unwrap();
    assert!(matches!(outcome, JoinOutcome::Cancelled));
    assert_eq!(world.store.participant_count(&session).await, 0);
}

#[tokio::test]
async fn test_device_denied_is_fatal_and_removes_record() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let registry = world.registry();
    let guest = UserId::from("guest");
    registry.request_join(&session, &guest).await.unwrap();
    registry
        .decide(&session, &guest, Verdict::Approved, &UserId::from("host"))
        .await
        .unwrap();

    let kit = world.kit_with_devices(Arc::new(MockMediaDevices::denying_user_media()));
    let err = client(&kit, "guest")
        .join(&session, None, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::DeviceDenied(_)));
    assert_eq!(
        registry.status(&session, &guest).await.unwrap(),
        None,
        "record removed so a retry starts over"
    );
}

#[tokio::test]
async fn test_host_waiting_room_tracks_requests() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let registry = world.registry();
    let host = UserId::from("host");

    registry
        .request_join(&session, &UserId::from("alice"))
        .await
        .unwrap();
    let mut room = WaitingRoom::new(registry.list_pending(&session, &host).await.unwrap());
    assert_eq!(room.len(), 1);

    // Replay admission events from the bus into the room.
    let memory = world.transport.clone();
    let mut bus = session_core::bus::SignalingBus::new(
        memory,
        session_core::bus::Backoff::default(),
        CancellationToken::new(),
    );
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    bus.subscribe(&session_core::bus::admission_topic(&session), tx)
        .await;

    registry
        .request_join(&session, &UserId::from("bob"))
        .await
        .unwrap();
    registry
        .decide(
            &session,
            &UserId::from("alice"),
            Verdict::Approved,
            &host,
        )
        .await
        .unwrap();

    for _ in 0..2 {
        let envelope = rx.recv().await.unwrap();
        if let session_core::bus::BusMessage::Admission(event) = &envelope.message {
            room.apply(event);
        }
    }

    let names: Vec<&str> = room.pending().iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(names, vec!["bob"]);
    assert_eq!(
        registry
            .status(&session, &UserId::from("alice"))
            .await
            .unwrap(),
        Some(ParticipantStatus::Approved)
    );
}

#[tokio::test]
async fn test_leaving_and_rejoining_starts_a_fresh_request() {
    let world = TestWorld::new();
    let session = world.create_session("standup", "host").await;
    let host_kit = world.client_kit();
    let JoinOutcome::Joined(host) = client(&host_kit, "host")
        .join(&session, None, CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("host should join");
    };
    let registry = world.registry();
    let guest = UserId::from("guest");

    let guest_kit = world.client_kit();
    let guest_client = client(&guest_kit, "guest");
    let session_clone = session.clone();
    let join = tokio::spawn(async move {
        guest_client
            .join(&session_clone, None, CancellationToken::new())
            .await
    });
    eventually("guest waiting", || async {
        pending_count(&world, &session).await == 1
    })
    .await;
    registry
        .decide(&session, &guest, Verdict::Approved, &UserId::from("host"))
        .await
        .unwrap();
    let JoinOutcome::Joined(mesh) = join.await.unwrap().unwrap() else {
        panic!("guest should join");
    };

    let host_id = host.handle.connection_id().clone();
    eventually("guest linked to host", || async {
        mesh.handle.state().await.unwrap().connected_peers() == vec![&host_id]
    })
    .await;

    mesh.handle.leave().await.unwrap();
    assert_eq!(registry.status(&session, &guest).await.unwrap(), None);
    assert_eq!(guest_kit.devices.live_streams(), 0);

    // The earlier approval does not carry over.
    let rejoin_kit = world.client_kit();
    let rejoin_client = client(&rejoin_kit, "guest");
    let cancel = CancellationToken::new();
    let (session_clone, cancel_clone) = (session.clone(), cancel.clone());
    let rejoin = tokio::spawn(async move {
        rejoin_client.join(&session_clone, None, cancel_clone).await
    });
    eventually("guest waiting again", || async {
        pending_count(&world, &session).await == 1
    })
    .await;
    assert_eq!(
        registry.status(&session, &guest).await.unwrap(),
        Some(ParticipantStatus::Pending)
    );
    assert!(!rejoin.is_finished());
    assert_eq!(rejoin_kit.devices.live_streams(), 0, "no media before approval");

    cancel.cancel();
    let outcome = rejoin.await.unwrap().unwrap();
    assert!(matches!(outcome, JoinOutcome::Cancelled));
}
