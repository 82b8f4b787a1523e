use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::event_translator::event_translator;
use super::types::ChannelEvent;
use crate::error::{ConnectError, TrackError, TransportError};
use crate::protocol::{ConnectionStatus, PresenceRecord};
use crate::transport::PresenceTransport;

/// Mutable client state shared with the event translator.
#[derive(Default)]
pub(crate) struct ClientState {
    pub(crate) status: ConnectionStatus,
    /// Record queued by `track()` before the subscription was live.
    pending: Option<PresenceRecord>,
    /// Last record successfully announced.
    tracked: Option<PresenceRecord>,
    last_sent: Option<Instant>,
    translator: Option<JoinHandle<()>>,
    /// Bumped on every subscription; stale translators check it.
    pub(crate) generation: u64,
    pub(crate) closed: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One presence subscription on one topic.
pub struct PresenceChannelClient {
    transport: Arc<dyn PresenceTransport>,
    topic: String,
    presence_key: String,
    events: mpsc::Sender<ChannelEvent>,
    state: Arc<Mutex<ClientState>>,
}

impl PresenceChannelClient {
    /// Create a client announcing under `presence_key` on `topic`. The
    /// receiver yields every [`ChannelEvent`] in order.
    pub fn new(
        transport: Arc<dyn PresenceTransport>,
        topic: impl Into<String>,
        presence_key: impl Into<String>,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events, rx) = mpsc::channel(256);
        let client = Self {
            transport,
            topic: topic.into(),
            presence_key: presence_key.into(),
            events,
            state: Arc::new(Mutex::new(ClientState::default())),
        };
        (client, rx)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status
    }

    /// When the last announcement was successfully sent.
    pub async fn last_sent(&self) -> Option<Instant> {
        self.state.lock().await.last_sent
    }

    /// Open the subscription. A no-op while already connecting or connected.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let generation = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(ConnectError::ShutDown);
            }
            if matches!(
                state.status,
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            ) {
                return Ok(());
            }
            state.status = ConnectionStatus::Connecting;
            state.generation += 1;
            if let Some(old) = state.translator.take() {
                old.abort();
            }
            state.generation
        };
        self.emit(ChannelEvent::Status(ConnectionStatus::Connecting))
            .await;
        debug!(topic = %self.topic, generation, "subscribing");

        let rx = match self
            .transport
            .subscribe(&self.topic, &self.presence_key)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "presence subscription failed");
                let current = {
                    let mut state = self.state.lock().await;
                    let current = !state.closed && state.generation == generation;
                    if current {
                        state.status = ConnectionStatus::Error;
                    }
                    current
                };
                if current {
                    self.emit(ChannelEvent::Status(ConnectionStatus::Error))
                        .await;
                }
                return Err(e.into());
            }
        };

        let flush = {
            let mut state = self.state.lock().await;
            if state.closed || state.generation != generation {
                drop(state);
                self.transport.unsubscribe(&self.topic).await;
                return Err(ConnectError::ShutDown);
            }
            state.status = ConnectionStatus::Connected;
            state.pending.take().or_else(|| state.tracked.clone())
        };

        info!(topic = %self.topic, "presence subscription live");
        // Connected must reach the consumer before the first snapshot.
        self.emit(ChannelEvent::Status(ConnectionStatus::Connected))
            .await;
        let translator = tokio::spawn(event_translator(
            rx,
            self.events.clone(),
            Arc::clone(&self.state),
            generation,
        ));
        {
            let mut state = self.state.lock().await;
            if state.generation == generation && !state.closed {
                state.translator = Some(translator);
            } else {
                translator.abort();
            }
        }

        if let Some(record) = flush {
            if let Err(e) = self.send_track(record.refreshed()).await {
                warn!(error = %e, "failed to flush queued presence");
            }
        }
        Ok(())
    }

    /// Announce `record`. Queued (latest wins) while not connected.
    pub async fn track(&self, record: PresenceRecord) -> Result<(), TrackError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(TrackError::ShutDown);
            }
            if state.status != ConnectionStatus::Connected {
                debug!(user_id = %record.user_id, "queueing presence until connected");
                state.pending = Some(record);
                return Ok(());
            }
        }
        self.send_track(record).await
    }

    /// Withdraw the local presence and forget any queued record.
    pub async fn untrack(&self) -> Result<(), TrackError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(TrackError::ShutDown);
            }
            state.pending = None;
            state.tracked = None;
            if state.status != ConnectionStatus::Connected {
                return Ok(());
            }
        }
        self.transport.untrack(&self.topic).await?;
        Ok(())
    }

    /// Broadcast an application event to the other subscribers.
    pub async fn publish(&self, event: &str, payload: serde_json::Value) -> Result<(), TrackError> {
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(TrackError::ShutDown);
            }
            if state.status != ConnectionStatus::Connected {
                return Err(TransportError::Closed.into());
            }
        }
        self.transport.publish(&self.topic, event, payload).await?;
        Ok(())
    }

    /// Tear down the subscription. No events are emitted once this returns.
    pub async fn disconnect(&self) {
        let translator = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.generation += 1;
            state.pending = None;
            state.status = ConnectionStatus::Disconnected;
            state.translator.take()
        };
        if let Some(translator) = translator {
            translator.abort();
            let _ = translator.await;
        }
        self.transport.unsubscribe(&self.topic).await;
        info!(topic = %self.topic, "presence channel closed");
    }

    /// On a transport failure the record is queued, so the next
    /// subscription announces it instead of an older one.
    async fn send_track(&self, record: PresenceRecord) -> Result<(), TrackError> {
        let payload = serde_json::to_value(&record)?;
        let sent = self.transport.track(&self.topic, payload).await;
        let mut state = self.state.lock().await;
        match sent {
            Ok(()) => {
                state.pending = None;
                state.tracked = Some(record);
                state.last_sent = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                if !state.closed {
                    state.pending = Some(record);
                }
                Err(e.into())
            }
        }
    }

    async fn emit(&self, event: ChannelEvent) {
        if self.state.lock().await.closed {
            return;
        }
        let _ = self.events.send(event).await;
    }
}
