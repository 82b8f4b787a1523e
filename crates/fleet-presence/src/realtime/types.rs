//! Configuration and Phoenix protocol frames.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for a Realtime endpoint.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `wss://<ref>.supabase.co/realtime/v1/websocket`.
    pub url: String,
    /// Project API key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) sent with the channel join.
    pub access_token: Option<String>,
    /// Interval between Phoenix socket heartbeats.
    pub socket_heartbeat: Duration,
    /// Upper bound on opening the socket and joining the channel.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("socket_heartbeat", &self.socket_heartbeat)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            access_token: None,
            socket_heartbeat: Duration::from_secs(25),
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Full socket URL including the API key and protocol version.
    pub(crate) fn ws_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}apikey={}&vsn=1.0.0",
            self.url, self.api_key
        )
    }

    /// Endpoint without query parameters, safe to log.
    pub(crate) fn display_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

/// Channel topic as it appears on the wire.
pub(crate) fn wire_topic(topic: &str) -> String {
    format!("realtime:{topic}")
}

impl PhoenixMessage {
    fn on(topic: &str, event: &str, payload: serde_json::Value, msg_ref: String) -> Self {
        Self {
            topic: wire_topic(topic),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }

    pub(crate) fn join(
        topic: &str,
        presence_key: &str,
        access_token: Option<&str>,
        msg_ref: String,
    ) -> Self {
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": presence_key }
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::Value::String(token.to_string());
        }
        Self::on(topic, "phx_join", payload, msg_ref)
    }

    pub(crate) fn leave(topic: &str, msg_ref: String) -> Self {
        Self::on(topic, "phx_leave", serde_json::json!({}), msg_ref)
    }

    pub(crate) fn track(topic: &str, meta: serde_json::Value, msg_ref: String) -> Self {
        Self::on(
            topic,
            "presence",
            serde_json::json!({ "type": "presence", "event": "track", "payload": meta }),
            msg_ref,
        )
    }

    pub(crate) fn untrack(topic: &str, msg_ref: String) -> Self {
        Self::on(
            topic,
            "presence",
            serde_json::json!({ "type": "presence", "event": "untrack" }),
            msg_ref,
        )
    }

    pub(crate) fn broadcast(
        topic: &str,
        event: &str,
        payload: serde_json::Value,
        msg_ref: String,
    ) -> Self {
        Self::on(
            topic,
            "broadcast",
            serde_json::json!({ "type": "broadcast", "event": event, "payload": payload }),
            msg_ref,
        )
    }

    pub(crate) fn heartbeat(msg_ref: String) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Sent from the transport handle to a running session.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Send {
        frame: PhoenixMessage,
        done: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Leave the channel and close the socket.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_appends_key_and_version() {
        let config = RealtimeConfig::new("wss://abc.supabase.co/realtime/v1/websocket", "anon");
        assert_eq!(
            config.ws_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            config.display_url(),
            "wss://abc.supabase.co/realtime/v1/websocket"
        );

        let with_query = RealtimeConfig::new("ws://localhost:4000/socket?log=1", "k");
        assert_eq!(
            with_query.ws_url(),
            "ws://localhost:4000/socket?log=1&apikey=k&vsn=1.0.0"
        );
        assert_eq!(with_query.display_url(), "ws://localhost:4000/socket");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = RealtimeConfig::new("wss://x", "secret-key").with_access_token("jwt");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("jwt"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn join_frame_shape() {
        let frame = PhoenixMessage::join("fleet", "u1", Some("tok"), "7".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["topic"], "realtime:fleet");
        assert_eq!(json["event"], "phx_join");
        assert_eq!(json["ref"], "7");
        assert_eq!(json["payload"]["config"]["presence"]["key"], "u1");
        assert_eq!(json["payload"]["access_token"], "tok");
    }

    #[test]
    fn presence_frames_shape() {
        let track = PhoenixMessage::track("fleet", serde_json::json!({"user_id": "u1"}), "1".into());
        assert_eq!(track.event, "presence");
        assert_eq!(track.payload["event"], "track");
        assert_eq!(track.payload["payload"]["user_id"], "u1");

        let untrack = PhoenixMessage::untrack("fleet", "2".into());
        assert_eq!(untrack.payload["event"], "untrack");
        assert!(untrack.payload.get("payload").is_none());

        let heartbeat = PhoenixMessage::heartbeat("3".into());
        assert_eq!(heartbeat.topic, "phoenix");
    }
}
