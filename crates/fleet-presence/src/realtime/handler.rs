//! Incoming Phoenix frame translation.

use tracing::{debug, info, warn};

use super::types::PhoenixMessage;
use crate::transport::{PresenceMap, TransportEvent};

/// What an incoming frame means for the session.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Server answered our `phx_join`.
    JoinReply(Result<(), String>),
    Event(TransportEvent),
    Ignore,
}

/// Parse a Phoenix presence map into `key -> metas`.
///
/// Supabase sends presence as `{ "key": { "metas": [{ ... }] } }`.
pub(crate) fn parse_presence_map(value: &serde_json::Value) -> PresenceMap {
    let mut result = PresenceMap::new();
    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if let Some(metas) = val.get("metas").and_then(|m| m.as_array()) {
                result.insert(key.clone(), metas.clone());
            }
        }
    }
    result
}

fn reply_reason(payload: &serde_json::Value) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error")
        .to_string()
}

/// Classify one frame received on a session joined to `wire_topic`.
pub(crate) fn translate_message(msg: &PhoenixMessage, wire_topic: &str, join_ref: &str) -> Inbound {
    if msg.topic != wire_topic {
        return Inbound::Ignore;
    }

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("error");
            if msg.msg_ref.as_deref() == Some(join_ref) {
                if status == "ok" {
                    Inbound::JoinReply(Ok(()))
                } else {
                    Inbound::JoinReply(Err(reply_reason(&msg.payload)))
                }
            } else {
                if status != "ok" {
                    warn!(topic = %msg.topic, reason = %reply_reason(&msg.payload), "request rejected");
                }
                Inbound::Ignore
            }
        }
        "phx_error" => {
            warn!(topic = %msg.topic, "channel error");
            Inbound::Event(TransportEvent::Error("channel error".to_string()))
        }
        "phx_close" => {
            info!(topic = %msg.topic, "channel closed by server");
            Inbound::Event(TransportEvent::Closed)
        }
        "broadcast" => {
            let event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Inbound::Event(TransportEvent::Broadcast { event, payload })
        }
        "presence_state" => {
            let state = parse_presence_map(&msg.payload);
            debug!(users = state.len(), "presence state received");
            Inbound::Event(TransportEvent::Sync(state))
        }
        "presence_diff" => {
            let joins = msg
                .payload
                .get("joins")
                .map(parse_presence_map)
                .unwrap_or_default();
            let leaves = msg
                .payload
                .get("leaves")
                .map(parse_presence_map)
                .unwrap_or_default();
            debug!(joins = joins.len(), leaves = leaves.len(), "presence diff received");
            Inbound::Event(TransportEvent::Diff { joins, leaves })
        }
        other => {
            debug!(event = %other, "unhandled Phoenix event");
            Inbound::Ignore
        }
    }
}
