use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::{ConnectError, PresenceError};
use crate::transport::{MemoryHub, MemoryTransport};

fn fast() -> PresenceSettings {
    PresenceSettings {
        network_quality: NetworkQuality::Fast,
        ..PresenceSettings::default()
    }
}

fn coordinator(
    hub: &MemoryHub,
    user_id: &str,
    settings: PresenceSettings,
) -> (PresenceCoordinator, MemoryTransport) {
    let transport = hub.transport();
    let identity = Identity::new(user_id, user_id, user_id.to_uppercase());
    let coordinator =
        PresenceCoordinator::new(Some(identity), Arc::new(transport.clone()), settings);
    (coordinator, transport)
}

/// Poll `$cond` until it holds, yielding to the runtime between checks.
macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let mut met = false;
        for _ in 0..400 {
            if $cond {
                met = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(met, "timed out waiting for {}", $what);
    }};
}

fn ids(users: &[OnlineUser]) -> Vec<String> {
    users.iter().map(|u| u.user_id.clone()).collect()
}

#[tokio::test]
async fn tracked_user_appears_in_room_and_leaves_on_untrack() {
    let hub = MemoryHub::new();
    let (coord, _transport) = coordinator(&hub, "u1", fast());
    coord.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, Some("r1".into()))
        .await
        .unwrap();

    eventually!(
        "u1 in r1",
        ids(&coord.users_in_room("r1").await) == vec!["u1".to_string()]
    );
    assert!(coord.is_online("u1").await);
    assert_eq!(coord.online_count().await, 1);
    assert_eq!(coord.status(), ConnectionStatus::Connected);

    coord
        .set_presence(PresenceStatus::Offline, None)
        .await
        .unwrap();
    eventually!("u1 gone", !coord.is_online("u1").await);
    assert!(coord.users_in_room("r1").await.is_empty());
    assert!(!coord.is_local_online());

    coord.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connects_back_off_then_give_up() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", PresenceSettings::default());
    assert_eq!(coord.presence_config().max_retries, 3);
    transport.fail_next_subscribes(4);

    let err = coord.start().await.unwrap_err();
    assert!(matches!(err, PresenceError::Connect(ConnectError::Transport(_))));

    tokio::time::sleep(Duration::from_secs(120)).await;

    let attempts = transport.subscribe_attempts().await;
    assert_eq!(attempts.len(), 4, "initial attempt plus three retries");
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert_eq!(coord.status(), ConnectionStatus::Error);
    assert_eq!(coord.reconnect_attempts().await, 3);

    // Only an explicit reconnect leaves the terminal state.
    coord.reconnect().await.unwrap();
    let mut status = coord.status_receiver();
    tokio::time::timeout(
        Duration::from_secs(1),
        status.wait_for(|s| *s == ConnectionStatus::Connected),
    )
    .await
    .expect("reconnected")
    .unwrap();
    eventually!("counter reset", coord.reconnect_attempts().await == 0);
    assert_eq!(transport.subscribe_attempts().await.len(), 5);

    coord.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_recovers_and_reannounces() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", fast());
    coord.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, Some("r1".into()))
        .await
        .unwrap();
    eventually!("u1 online", coord.is_online("u1").await);

    transport.drop_connection().await;
    eventually!("disconnect noticed", coord.status() != ConnectionStatus::Connected);

    eventually!(
        "re-announced",
        hub.tracked_keys(DEFAULT_CHANNEL).await == vec!["u1".to_string()]
            && coord.status() == ConnectionStatus::Connected
    );
    eventually!(
        "store rebuilt",
        ids(&coord.users_in_room("r1").await) == vec!["u1".to_string()]
    );
    assert_eq!(transport.subscribe_attempts().await.len(), 2);
    assert_eq!(coord.reconnect_attempts().await, 0);

    coord.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn room_change_during_outage_is_announced_after_reconnect() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", fast());
    let (peer, _) = coordinator(&hub, "peer", fast());
    coord.start().await.unwrap();
    peer.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, Some("r1".into()))
        .await
        .unwrap();
    eventually!(
        "peer sees u1 in r1",
        ids(&peer.users_in_room("r1").await) == vec!["u1".to_string()]
    );

    transport.drop_connection().await;
    // Rejected by the dead socket or queued, depending on whether the
    // close was seen yet. Either way the move must not be lost.
    let _ = coord.room_changed(Some("r2".into())).await;
    assert!(coord.is_local_online());

    eventually!(
        "u1 re-announced in r2",
        ids(&peer.users_in_room("r2").await) == vec!["u1".to_string()]
            && coord.status() == ConnectionStatus::Connected
    );
    assert!(peer.users_in_room("r1").await.is_empty());
    assert_eq!(
        ids(&coord.users_in_room("r2").await),
        vec!["u1".to_string()]
    );

    coord.disconnect().await;
    peer.disconnect().await;
}

#[tokio::test]
async fn peers_see_each_other_and_room_moves() {
    let hub = MemoryHub::new();
    let (alice, _) = coordinator(&hub, "alice", fast());
    let (bob, bob_transport) = coordinator(&hub, "bob", fast());
    alice.start().await.unwrap();
    bob.start().await.unwrap();

    alice
        .set_presence(PresenceStatus::Online, Some("yard".into()))
        .await
        .unwrap();
    bob.set_presence(PresenceStatus::Online, Some("yard".into()))
        .await
        .unwrap();

    eventually!(
        "both in yard",
        ids(&alice.users_in_room("yard").await) == vec!["alice".to_string(), "bob".to_string()]
    );

    let mut peer_events = alice.subscribe_peer_events();
    bob.room_changed(Some("workshop".into())).await.unwrap();
    eventually!(
        "bob moved",
        ids(&alice.users_in_room("workshop").await) == vec!["bob".to_string()]
    );
    assert_eq!(ids(&alice.users_in_room("yard").await), vec!["alice".to_string()]);
    assert_eq!(alice.online_count().await, 2);
    assert_eq!(bob_transport.published(), 1);
    let moved = tokio::time::timeout(Duration::from_secs(1), peer_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.event, events::ROOM_CHANGED);
    assert_eq!(moved.payload["user_id"], "bob");
    assert_eq!(moved.payload["from"], "yard");
    assert_eq!(moved.payload["to"], "workshop");
    assert_eq!(bob.current_room().await.as_deref(), Some("workshop"));

    let counts = alice.room_counts().await;
    assert_eq!(counts.get("yard"), Some(&1));
    assert_eq!(counts.get("workshop"), Some(&1));

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test]
async fn room_change_while_offline_is_only_remembered() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", fast());
    coord.start().await.unwrap();

    coord.room_changed(Some("r5".into())).await.unwrap();
    assert_eq!(transport.tracks_sent(), 0);
    assert_eq!(transport.published(), 0);
    assert_eq!(coord.current_room().await.as_deref(), Some("r5"));

    coord.disconnect().await;
}

#[tokio::test]
async fn without_identity_nothing_touches_the_network() {
    let hub = MemoryHub::new();
    let transport = hub.transport();
    let coord = PresenceCoordinator::new(None, Arc::new(transport.clone()), fast());

    assert!(matches!(
        coord.start().await,
        Err(PresenceError::Connect(ConnectError::NoIdentity))
    ));
    coord
        .set_presence(PresenceStatus::Online, Some("r1".into()))
        .await
        .unwrap();
    coord.room_changed(Some("r2".into())).await.unwrap();
    assert!(matches!(
        coord.reconnect().await,
        Err(PresenceError::Connect(ConnectError::NoIdentity))
    ));

    assert!(transport.subscribe_attempts().await.is_empty());
    assert_eq!(transport.tracks_sent(), 0);
    assert_eq!(coord.status(), ConnectionStatus::Disconnected);
    coord.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent_and_terminal() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", fast());
    coord.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, None)
        .await
        .unwrap();
    eventually!("online", coord.is_online("u1").await);

    coord.disconnect().await;
    coord.disconnect().await;
    assert_eq!(coord.status(), ConnectionStatus::Disconnected);
    assert!(hub.tracked_keys(DEFAULT_CHANNEL).await.is_empty());
    assert!(!coord.is_online("u1").await);
    assert_eq!(coord.online_count().await, 0);

    let sent = transport.tracks_sent();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.tracks_sent(), sent, "no heartbeats after disconnect");
    assert_eq!(transport.subscribe_attempts().await.len(), 1, "no reconnects");
    assert_eq!(coord.status(), ConnectionStatus::Disconnected);

    assert!(matches!(
        coord.set_presence(PresenceStatus::Online, Some("r9".into())).await,
        Err(PresenceError::Connect(ConnectError::ShutDown))
    ));
    assert!(matches!(
        coord.room_changed(Some("r9".into())).await,
        Err(PresenceError::Connect(ConnectError::ShutDown))
    ));
    assert!(!coord.is_local_online());
    assert_eq!(coord.current_room().await, None);
    assert!(matches!(
        coord.start().await,
        Err(PresenceError::Connect(ConnectError::ShutDown))
    ));
    assert!(matches!(
        coord.reconnect().await,
        Err(PresenceError::Connect(ConnectError::ShutDown))
    ));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_follows_visibility() {
    let hub = MemoryHub::new();
    let (coord, transport) = coordinator(&hub, "u1", fast());
    coord.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, Some("r1".into()))
        .await
        .unwrap();
    assert_eq!(transport.tracks_sent(), 1);

    tokio::time::sleep(Duration::from_millis(10_100)).await;
    assert_eq!(transport.tracks_sent(), 2);

    coord.suspend().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.tracks_sent(), 2);

    coord.resume().await;
    tokio::time::sleep(Duration::from_millis(10_100)).await;
    assert_eq!(transport.tracks_sent(), 3);

    coord.disconnect().await;
}

#[tokio::test]
async fn network_quality_changes_timing() {
    let hub = MemoryHub::new();
    let (coord, _) = coordinator(&hub, "u1", PresenceSettings::default());
    assert_eq!(coord.network_quality(), NetworkQuality::Unknown);

    assert!(coord.set_network_quality(Some("2g")).await);
    assert_eq!(coord.network_quality(), NetworkQuality::Slow);
    assert_eq!(coord.presence_config().max_retries, 2);
    assert_eq!(
        coord.presence_config().heartbeat_interval,
        Duration::from_secs(30)
    );
    assert!(!coord.set_network_quality(Some("slow")).await);
}

#[tokio::test]
async fn store_changes_are_observable() {
    let hub = MemoryHub::new();
    let (coord, _) = coordinator(&hub, "u1", fast());
    let mut changes = coord.subscribe_changes().await;

    coord.start().await.unwrap();
    coord
        .set_presence(PresenceStatus::Online, None)
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, StoreChange::Synced { count: 0 });
    let second = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        second,
        StoreChange::Joined {
            user_id: "u1".into()
        }
    );
    assert_eq!(coord.user("u1").await.unwrap().display_name, "U1");

    coord.disconnect().await;
}
