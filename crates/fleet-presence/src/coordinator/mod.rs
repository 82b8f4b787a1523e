//! Presence coordinator.
//!
//! Wires the channel client, heartbeat, reconnection manager, network
//! monitor and state store together for one local identity. Consumers
//! query copies of the merged state; only the event loop writes it until
//! `disconnect()` clears it.

mod event_loop;
mod types;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelEvent, PresenceChannelClient};
use crate::error::{ConnectError, PresenceError};
use crate::heartbeat::HeartbeatScheduler;
use crate::identity::Identity;
use crate::network::{NetworkQuality, NetworkQualityMonitor, PresenceConfig};
use crate::protocol::{events, ConnectionStatus, OnlineUser, PresenceRecord, PresenceStatus};
use crate::reconnect::ReconnectionManager;
use crate::store::{PresenceStateStore, StoreChange};
use crate::transport::PresenceTransport;

use event_loop::EventLoop;
use types::LoopCommand;
pub use types::{PeerEvent, PresenceSettings, DEFAULT_CHANNEL};

/// Receivers handed to the event loop on `start()`.
struct Pending {
    events: mpsc::Receiver<ChannelEvent>,
    commands: mpsc::Receiver<LoopCommand>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct PresenceCoordinator {
    identity: Option<Identity>,
    /// `None` without an identity; nothing touches the network then.
    client: Option<Arc<PresenceChannelClient>>,
    store: Arc<RwLock<PresenceStateStore>>,
    network: Arc<NetworkQualityMonitor>,
    reconnect: Arc<Mutex<ReconnectionManager>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    peer_events: broadcast::Sender<PeerEvent>,
    /// The local record while online, `None` while offline.
    local: watch::Sender<Option<PresenceRecord>>,
    /// Last room reported by the host, kept while offline.
    room: Mutex<Option<String>>,
    commands: mpsc::Sender<LoopCommand>,
    pending: Mutex<Option<Pending>>,
    heartbeat: Mutex<Option<HeartbeatScheduler>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl PresenceCoordinator {
    pub fn new(
        identity: Option<Identity>,
        transport: Arc<dyn PresenceTransport>,
        settings: PresenceSettings,
    ) -> Self {
        let network = Arc::new(NetworkQualityMonitor::new(settings.network_quality));
        let reconnect = ReconnectionManager::new(settings.backoff, network.current().max_retries);
        let (commands, commands_rx) = mpsc::channel(8);

        let (client, pending) = match &identity {
            Some(identity) => {
                let (client, events) =
                    PresenceChannelClient::new(transport, settings.channel, identity.user_id.clone());
                let pending = Pending {
                    events,
                    commands: commands_rx,
                };
                (Some(Arc::new(client)), Some(pending))
            }
            None => (None, None),
        };

        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (local, _) = watch::channel(None);
        let (peer_events, _) = broadcast::channel(64);
        Self {
            identity,
            client,
            store: Arc::new(RwLock::new(PresenceStateStore::new())),
            network,
            reconnect: Arc::new(Mutex::new(reconnect)),
            status: Arc::new(status),
            peer_events,
            local,
            room: Mutex::new(None),
            commands,
            pending: Mutex::new(pending),
            heartbeat: Mutex::new(None),
            event_loop: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Spawn the event loop and heartbeat, then connect. A failed first
    /// connect is returned but still retried in the background.
    pub async fn start(&self) -> Result<(), PresenceError> {
        let client = self.active_client()?;
        let Some(pending) = self.pending.lock().await.take() else {
            debug!("presence already started");
            return Ok(());
        };

        let event_loop = EventLoop {
            client: Arc::clone(client),
            store: Arc::clone(&self.store),
            reconnect: Arc::clone(&self.reconnect),
            network: Arc::clone(&self.network),
            status: Arc::clone(&self.status),
            peer_events: self.peer_events.clone(),
            commands: self.commands.clone(),
            closed: Arc::clone(&self.closed),
        };
        *self.event_loop.lock().await =
            Some(tokio::spawn(event_loop.run(pending.events, pending.commands)));
        *self.heartbeat.lock().await = Some(HeartbeatScheduler::start(
            Arc::clone(client),
            self.local.subscribe(),
            self.status.subscribe(),
            self.network.subscribe(),
        ));

        info!(topic = %client.topic(), quality = %self.network.quality(), "presence starting");
        client.connect().await?;
        Ok(())
    }

    /// Go online in `room_id`, or offline.
    pub async fn set_presence(
        &self,
        status: PresenceStatus,
        room_id: Option<String>,
    ) -> Result<(), PresenceError> {
        let (Some(identity), Some(client)) = (&self.identity, &self.client) else {
            return Ok(());
        };
        self.ensure_open()?;
        *self.room.lock().await = room_id.clone();
        match status {
            PresenceStatus::Online => {
                let record = identity.to_record(room_id);
                self.local.send_replace(Some(record.clone()));
                client.track(record).await?;
            }
            PresenceStatus::Offline => {
                self.local.send_replace(None);
                client.untrack().await?;
            }
        }
        debug!(status = ?status, "local presence updated");
        Ok(())
    }

    /// The host navigated to `room_id`. Re-announces while online; while
    /// offline the room is only remembered.
    pub async fn room_changed(&self, room_id: Option<String>) -> Result<(), PresenceError> {
        let (Some(identity), Some(client)) = (&self.identity, &self.client) else {
            return Ok(());
        };
        self.ensure_open()?;
        let previous = std::mem::replace(&mut *self.room.lock().await, room_id.clone());
        if self.local.borrow().is_none() {
            return Ok(());
        }

        let record = identity.to_record(room_id.clone());
        self.local.send_replace(Some(record.clone()));
        client.track(record).await?;

        let payload = serde_json::json!({
            "user_id": identity.user_id,
            "from": previous,
            "to": room_id,
        });
        if let Err(e) = client.publish(events::ROOM_CHANGED, payload).await {
            debug!(error = %e, "room change broadcast skipped");
        }
        Ok(())
    }

    /// Apply a host network hint. Returns true when presence timing changed.
    pub async fn set_network_quality(&self, hint: Option<&str>) -> bool {
        let changed = self.network.update_hint(hint);
        if changed {
            self.reconnect
                .lock()
                .await
                .set_max_retries(self.network.current().max_retries);
        }
        changed
    }

    /// Host became hidden: pause heartbeats.
    pub async fn suspend(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().await.as_ref() {
            heartbeat.suspend();
        }
    }

    pub async fn resume(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().await.as_ref() {
            heartbeat.resume();
        }
    }

    /// Manual recovery, typically from the terminal `Error` state.
    pub async fn reconnect(&self) -> Result<(), PresenceError> {
        let client = self.active_client()?;
        self.reconnect.lock().await.reset();
        info!("manual presence reconnect");
        client.connect().await?;
        Ok(())
    }

    /// Shut down for good. Idempotent.
    pub async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            heartbeat.stop();
        }
        self.reconnect.lock().await.cancel();
        if let Some(client) = &self.client {
            client.disconnect().await;
        }
        if let Some(task) = self.event_loop.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.store.write().await.clear();
        self.local.send_replace(None);
        self.status.send_replace(ConnectionStatus::Disconnected);
        info!("presence disconnected");
    }

    fn active_client(&self) -> Result<&Arc<PresenceChannelClient>, ConnectError> {
        let Some(client) = &self.client else {
            info!("no local identity, presence disabled");
            return Err(ConnectError::NoIdentity);
        };
        self.ensure_open()?;
        Ok(client)
    }

    fn ensure_open(&self) -> Result<(), ConnectError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectError::ShutDown);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.store.read().await.is_online(user_id)
    }

    pub async fn users_in_room(&self, room_id: &str) -> Vec<OnlineUser> {
        self.store.read().await.users_in_room(room_id)
    }

    pub async fn online_count(&self) -> usize {
        self.store.read().await.global_count()
    }

    pub async fn online_users(&self) -> Vec<OnlineUser> {
        self.store.read().await.online_users()
    }

    pub async fn user(&self, user_id: &str) -> Option<OnlineUser> {
        self.store.read().await.user(user_id)
    }

    pub async fn room_counts(&self) -> BTreeMap<String, usize> {
        self.store.read().await.room_counts()
    }

    pub async fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.store.read().await.subscribe()
    }

    /// Application events published by peers, such as room changes.
    pub fn subscribe_peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.peer_events.subscribe()
    }

    pub async fn current_room(&self) -> Option<String> {
        self.room.lock().await.clone()
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        self.reconnect.lock().await.attempts()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn presence_config(&self) -> PresenceConfig {
        self.network.current()
    }

    pub fn network_quality(&self) -> NetworkQuality {
        self.network.quality()
    }

    pub fn is_local_online(&self) -> bool {
        self.local.borrow().is_some()
    }
}
