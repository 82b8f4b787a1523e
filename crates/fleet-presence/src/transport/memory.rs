//! In-process presence hub.
//!
//! Every [`MemoryTransport`] created from the same [`MemoryHub`] behaves
//! like one client socket on a shared server. Presence metas are kept per
//! connection and fanned out as `Sync`/`Diff` events the way a Phoenix
//! presence server would. Fault injection hooks let tests simulate refused
//! connections, failing sends and dropped sockets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{PresenceMap, PresenceTransport, TransportEvent};
use crate::error::TransportError;

struct Member {
    key: String,
    tx: mpsc::Sender<TransportEvent>,
    meta: Option<serde_json::Value>,
}

#[derive(Default)]
struct HubState {
    /// topic -> connection id -> member
    topics: HashMap<String, HashMap<u64, Member>>,
}

/// Shared server side of the in-process transport.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
    next_conn: Arc<AtomicU64>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client connection to this hub.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            conn_id: self.next_conn.fetch_add(1, Ordering::Relaxed) + 1,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Keys currently tracked on `topic`, sorted.
    pub async fn tracked_keys(&self, topic: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .topics
            .get(topic)
            .map(|members| presence_state(members).into_keys().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let state = self.state.lock().await;
        state.topics.get(topic).map(|m| m.len()).unwrap_or(0)
    }
}

#[derive(Default)]
struct Faults {
    fail_subscribes: AtomicU32,
    fail_sends: AtomicBool,
    tracks_sent: AtomicUsize,
    untracks_sent: AtomicUsize,
    published: AtomicUsize,
    subscribe_attempts: Mutex<Vec<Instant>>,
}

/// One client connection to a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
    conn_id: u64,
    faults: Arc<Faults>,
}

impl MemoryTransport {
    /// Make the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.faults.fail_subscribes.store(n, Ordering::SeqCst);
    }

    /// Make every send (track, untrack, publish) fail while set.
    pub fn fail_sends(&self, fail: bool) {
        self.faults.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate the socket dying: every subscription of this connection
    /// receives `Closed` and its presence leaves the hub.
    pub async fn drop_connection(&self) {
        let mut state = self.hub.state.lock().await;
        for members in state.topics.values_mut() {
            if let Some(member) = members.remove(&self.conn_id) {
                let _ = member.tx.try_send(TransportEvent::Closed);
                announce_leave(members, &member);
            }
        }
        debug!(conn = self.conn_id, "memory connection dropped");
    }

    /// Successful track sends.
    pub fn tracks_sent(&self) -> usize {
        self.faults.tracks_sent.load(Ordering::SeqCst)
    }

    /// Successful untrack sends.
    pub fn untracks_sent(&self) -> usize {
        self.faults.untracks_sent.load(Ordering::SeqCst)
    }

    /// Successful publishes.
    pub fn published(&self) -> usize {
        self.faults.published.load(Ordering::SeqCst)
    }

    /// When each subscribe call was made, successful or not.
    pub async fn subscribe_attempts(&self) -> Vec<Instant> {
        self.faults.subscribe_attempts.lock().await.clone()
    }

    fn check_send(&self) -> Result<(), TransportError> {
        if self.faults.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected send failure".into()));
        }
        Ok(())
    }

    fn take_subscribe_failure(&self) -> bool {
        self.faults
            .fail_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PresenceTransport for MemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        presence_key: &str,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.faults
            .subscribe_attempts
            .lock()
            .await
            .push(Instant::now());
        if self.take_subscribe_failure() {
            return Err(TransportError::Connect("injected connect failure".into()));
        }

        let (tx, rx) = mpsc::channel(256);
        let mut state = self.hub.state.lock().await;
        let members = state.topics.entry(topic.to_string()).or_default();
        if let Some(previous) = members.remove(&self.conn_id) {
            announce_leave(members, &previous);
        }
        members.insert(
            self.conn_id,
            Member {
                key: presence_key.to_string(),
                tx: tx.clone(),
                meta: None,
            },
        );
        let _ = tx.try_send(TransportEvent::Sync(presence_state(members)));
        debug!(conn = self.conn_id, topic = %topic, "memory subscription opened");
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) {
        let mut state = self.hub.state.lock().await;
        if let Some(members) = state.topics.get_mut(topic) {
            if let Some(member) = members.remove(&self.conn_id) {
                announce_leave(members, &member);
            }
        }
    }

    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.check_send()?;
        let state = self.hub.state.lock().await;
        let members = state.topics.get(topic).ok_or(TransportError::Closed)?;
        if !members.contains_key(&self.conn_id) {
            return Err(TransportError::Closed);
        }
        for (id, member) in members {
            // Broadcasts are not echoed back to the sender.
            if *id != self.conn_id {
                deliver(
                    member,
                    TransportEvent::Broadcast {
                        event: event.to_string(),
                        payload: payload.clone(),
                    },
                );
            }
        }
        self.faults.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn track(&self, topic: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        self.check_send()?;
        let mut state = self.hub.state.lock().await;
        let members = state
            .topics
            .get_mut(topic)
            .ok_or(TransportError::Closed)?;
        let member = members
            .get_mut(&self.conn_id)
            .ok_or(TransportError::Closed)?;

        let meta = with_phx_ref(payload, self.conn_id);
        member.meta = Some(meta.clone());
        let key = member.key.clone();

        let joins = PresenceMap::from([(key, vec![meta])]);
        fan_out(members, || TransportEvent::Diff {
            joins: joins.clone(),
            leaves: PresenceMap::new(),
        });
        self.faults.tracks_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn untrack(&self, topic: &str) -> Result<(), TransportError> {
        self.check_send()?;
        let mut state = self.hub.state.lock().await;
        let members = state
            .topics
            .get_mut(topic)
            .ok_or(TransportError::Closed)?;
        let member = members
            .get_mut(&self.conn_id)
            .ok_or(TransportError::Closed)?;

        if let Some(meta) = member.meta.take() {
            let key = member.key.clone();
            announce_meta_left(members, &key, meta);
        }
        self.faults.untracks_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_phx_ref(payload: serde_json::Value, conn_id: u64) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(mut map) => {
            map.insert(
                "phx_ref".into(),
                serde_json::Value::String(format!("mem-{conn_id}")),
            );
            serde_json::Value::Object(map)
        }
        other => other,
    }
}

fn presence_state(members: &HashMap<u64, Member>) -> PresenceMap {
    let mut state = PresenceMap::new();
    for member in members.values() {
        if let Some(meta) = &member.meta {
            state
                .entry(member.key.clone())
                .or_default()
                .push(meta.clone());
        }
    }
    state
}

fn deliver(member: &Member, event: TransportEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = member.tx.try_send(event) {
        warn!(key = %member.key, "memory subscriber lagging, event dropped");
    }
}

fn fan_out(members: &HashMap<u64, Member>, event: impl Fn() -> TransportEvent) {
    for member in members.values() {
        deliver(member, event());
    }
}

/// Tell remaining members that `member` went away, if it had presence.
fn announce_leave(members: &HashMap<u64, Member>, member: &Member) {
    if let Some(meta) = member.meta.clone() {
        announce_meta_left(members, &member.key, meta);
    }
}

/// Only the departed meta is listed; the key stays present for peers
/// while another connection still tracks it.
fn announce_meta_left(members: &HashMap<u64, Member>, key: &str, meta: serde_json::Value) {
    let event = TransportEvent::Diff {
        joins: PresenceMap::new(),
        leaves: PresenceMap::from([(key.to_string(), vec![meta])]),
    };
    fan_out(members, || event.clone());
}
