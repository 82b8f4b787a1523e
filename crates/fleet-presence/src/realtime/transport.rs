use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::connection::{next_ref, session_loop, SessionParams};
use super::types::{PhoenixMessage, RealtimeConfig, SessionCommand};
use crate::error::TransportError;
use crate::transport::{PresenceTransport, TransportEvent};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

struct Session {
    command_tx: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

impl Session {
    async fn shutdown(mut self) {
        let _ = self.command_tx.send(SessionCommand::Close).await;
        if tokio::time::timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            self.task.abort();
        }
    }
}

/// [`PresenceTransport`] over Supabase Realtime.
pub struct RealtimeTransport {
    config: RealtimeConfig,
    sessions: Mutex<HashMap<String, Session>>,
}

impl RealtimeTransport {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn send(&self, topic: &str, frame: PhoenixMessage) -> Result<(), TransportError> {
        let command_tx = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(topic)
                .map(|s| s.command_tx.clone())
                .ok_or(TransportError::Closed)?
        };
        let (done, result) = oneshot::channel();
        command_tx
            .send(SessionCommand::Send { frame, done })
            .await
            .map_err(|_| TransportError::Closed)?;
        result.await.map_err(|_| TransportError::Closed)?
    }
}

#[async_trait]
impl PresenceTransport for RealtimeTransport {
    async fn subscribe(
        &self,
        topic: &str,
        presence_key: &str,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        if let Some(previous) = self.sessions.lock().await.remove(topic) {
            previous.shutdown().await;
        }

        let timeout = self.config.connect_timeout;
        let conn_id = fleet_common::new_correlation_id();
        info!(conn = %conn_id, url = %self.config.display_url(), topic = %topic, "connecting to Realtime");

        let (ws, _) = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.config.ws_url()),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| {
            error!(conn = %conn_id, error = %e, "failed to connect to Realtime");
            TransportError::Connect(e.to_string())
        })?;

        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (joined_tx, joined_rx) = oneshot::channel();
        let params = SessionParams {
            conn_id,
            topic: topic.to_string(),
            presence_key: presence_key.to_string(),
            access_token: self.config.access_token.clone(),
            heartbeat: self.config.socket_heartbeat,
        };
        let task = tokio::spawn(session_loop(ws, params, joined_tx, event_tx, command_rx));
        let session = Session { command_tx, task };

        let joined = match tokio::time::timeout(timeout, joined_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        if let Err(e) = joined {
            session.shutdown().await;
            return Err(e);
        }

        self.sessions.lock().await.insert(topic.to_string(), session);
        Ok(event_rx)
    }

    async fn unsubscribe(&self, topic: &str) {
        let session = self.sessions.lock().await.remove(topic);
        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send(topic, PhoenixMessage::broadcast(topic, event, payload, next_ref()))
            .await
    }

    async fn track(&self, topic: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        self.send(topic, PhoenixMessage::track(topic, payload, next_ref()))
            .await
    }

    async fn untrack(&self, topic: &str) -> Result<(), TransportError> {
        self.send(topic, PhoenixMessage::untrack(topic, next_ref()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_without_session_report_closed() {
        let transport = RealtimeTransport::new(RealtimeConfig::new("ws://127.0.0.1:9", "k"));
        assert_eq!(
            transport.track("fleet", serde_json::json!({})).await,
            Err(TransportError::Closed)
        );
        assert_eq!(transport.untrack("fleet").await, Err(TransportError::Closed));
        transport.unsubscribe("fleet").await;
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_subscribe() {
        let mut config = RealtimeConfig::new("ws://127.0.0.1:9/socket", "k");
        config.connect_timeout = Duration::from_secs(2);
        let transport = RealtimeTransport::new(config);
        assert!(transport.subscribe("fleet", "u1").await.is_err());
    }
}
