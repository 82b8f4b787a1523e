//! The single task that applies channel events to the store and drives
//! reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info};

use super::types::{LoopCommand, PeerEvent};
use crate::channel::{ChannelEvent, PresenceChannelClient};
use crate::network::NetworkQualityMonitor;
use crate::protocol::ConnectionStatus;
use crate::reconnect::{ReconnectDecision, ReconnectionManager};
use crate::store::PresenceStateStore;

pub(crate) struct EventLoop {
    pub(crate) client: Arc<PresenceChannelClient>,
    pub(crate) store: Arc<RwLock<PresenceStateStore>>,
    pub(crate) reconnect: Arc<Mutex<ReconnectionManager>>,
    pub(crate) network: Arc<NetworkQualityMonitor>,
    pub(crate) status: Arc<watch::Sender<ConnectionStatus>>,
    pub(crate) peer_events: broadcast::Sender<PeerEvent>,
    pub(crate) commands: mpsc::Sender<LoopCommand>,
    pub(crate) closed: Arc<AtomicBool>,
}

impl EventLoop {
    pub(crate) async fn run(
        self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<LoopCommand>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return,
                },
                command = commands.recv() => match command {
                    Some(LoopCommand::Reconnect) => self.retry().await,
                    None => return,
                },
            }
        }
    }

    async fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Sync(records) => self.store.write().await.apply_sync(records),
            ChannelEvent::Join { user_id, record } => {
                debug!(user_id = %user_id, room_id = ?record.room_id, "presence join");
                self.store.write().await.apply_join(&user_id, record);
            }
            ChannelEvent::Leave { user_id } => {
                debug!(user_id = %user_id, "presence leave");
                self.store.write().await.apply_leave(&user_id);
            }
            ChannelEvent::Broadcast { event, payload } => {
                // Nobody listening is fine.
                let _ = self.peer_events.send(PeerEvent { event, payload });
            }
            ChannelEvent::Status(status) => self.on_status(status).await,
        }
    }

    async fn on_status(&self, status: ConnectionStatus) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.status.send_replace(status);

        // Decide and arm under one lock so a concurrent cancel either
        // sees the timer or prevents it.
        let mut reconnect = self.reconnect.lock().await;
        reconnect.set_max_retries(self.network.current().max_retries);
        match reconnect.on_status(status) {
            ReconnectDecision::Schedule { attempt, delay } => {
                info!(
                    attempt,
                    max_retries = reconnect.max_retries(),
                    delay_ms = delay.as_millis() as u64,
                    "presence reconnect scheduled"
                );
                let commands = self.commands.clone();
                reconnect.arm(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = commands.send(LoopCommand::Reconnect).await;
                }));
            }
            ReconnectDecision::GiveUp(err) => {
                error!(error = %err, "presence unavailable until reconnect() is called");
                self.status.send_replace(ConnectionStatus::Error);
            }
            ReconnectDecision::Reset | ReconnectDecision::Ignore => {}
        }
    }

    async fn retry(&self) {
        self.reconnect.lock().await.fired();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // The outcome arrives as a status event on this loop.
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            if let Err(e) = client.connect().await {
                debug!(error = %e, "reconnect attempt failed");
            }
        });
    }
}
