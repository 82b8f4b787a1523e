//! Background task that turns `TransportEvent`s into `ChannelEvent`s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::client::ClientState;
use super::types::ChannelEvent;
use crate::protocol::{ConnectionStatus, PresenceRecord};
use crate::transport::{PresenceMap, TransportEvent};

// ---------------------------------------------------------------------------
// Event Translator
// ---------------------------------------------------------------------------

/// Forward events from one subscription until it ends. Events are dropped
/// once the subscription is superseded or the client is shut down.
pub(crate) async fn event_translator(
    mut rx: mpsc::Receiver<TransportEvent>,
    tx: mpsc::Sender<ChannelEvent>,
    state: Arc<Mutex<ClientState>>,
    generation: u64,
) {
    let mut metas = PresenceMetas::default();
    loop {
        let (events, end_status) = match rx.recv().await {
            Some(TransportEvent::Sync(map)) => (vec![ChannelEvent::Sync(metas.sync(map))], None),
            Some(TransportEvent::Diff { joins, leaves }) => (metas.diff(joins, &leaves), None),
            Some(TransportEvent::Broadcast { event, payload }) => {
                debug!(event = %event, "broadcast received");
                (vec![ChannelEvent::Broadcast { event, payload }], None)
            }
            Some(TransportEvent::Error(message)) => {
                warn!(message = %message, "presence subscription failed");
                (Vec::new(), Some(ConnectionStatus::Error))
            }
            Some(TransportEvent::Closed) | None => (Vec::new(), Some(ConnectionStatus::Disconnected)),
        };

        {
            let mut state = state.lock().await;
            if state.closed || state.generation != generation {
                return;
            }
            if let Some(status) = end_status {
                state.status = status;
            }
        }

        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
        if let Some(status) = end_status {
            let _ = tx.send(ChannelEvent::Status(status)).await;
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The newest meta under `key` as a record. Metas without a `user_id` are
/// discarded. The presence key wins over the meta's own `user_id`.
fn parse_presence_meta(key: &str, metas: &[serde_json::Value]) -> Option<PresenceRecord> {
    let meta = metas.last()?;
    match serde_json::from_value::<PresenceRecord>(meta.clone()) {
        Ok(mut record) => {
            record.user_id = key.to_string();
            Some(record)
        }
        Err(e) => {
            debug!(key = %key, error = %e, "discarding malformed presence meta");
            None
        }
    }
}

pub(crate) fn records_from_map(map: &PresenceMap) -> Vec<PresenceRecord> {
    map.iter()
        .filter_map(|(key, metas)| parse_presence_meta(key, metas))
        .collect()
}

fn phx_ref(meta: &serde_json::Value) -> Option<&str> {
    meta.get("phx_ref").and_then(|r| r.as_str())
}

fn same_meta(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (phx_ref(a), phx_ref(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Live metas per presence key, one per connection tracking that key.
/// A key is online while at least one of its metas is.
#[derive(Debug, Default)]
pub(crate) struct PresenceMetas {
    keys: PresenceMap,
}

impl PresenceMetas {
    /// Adopt a full snapshot.
    pub(crate) fn sync(&mut self, map: PresenceMap) -> Vec<PresenceRecord> {
        self.keys = map;
        self.keys.retain(|_, metas| !metas.is_empty());
        records_from_map(&self.keys)
    }

    /// Apply one diff. Departed metas are removed before new ones are
    /// added, so a key leaving and rejoining in one diff is an update.
    /// A key only leaves once its last meta is gone; otherwise its newest
    /// remaining meta is re-emitted as a join.
    pub(crate) fn diff(&mut self, joins: PresenceMap, leaves: &PresenceMap) -> Vec<ChannelEvent> {
        let mut touched: HashMap<String, bool> = HashMap::new();
        for (key, departed) in leaves {
            if let Some(live) = self.keys.get_mut(key) {
                live.retain(|meta| !departed.iter().any(|gone| same_meta(meta, gone)));
            }
            touched.insert(key.clone(), false);
        }
        for (key, arrived) in joins {
            let live = self.keys.entry(key.clone()).or_default();
            for meta in arrived {
                live.retain(|existing| !same_meta(existing, &meta));
                live.push(meta);
            }
            touched.insert(key, true);
        }

        let mut left = Vec::new();
        let mut joined = Vec::new();
        for (key, has_join) in touched {
            let remaining = self.keys.get(&key).map_or(0, Vec::len);
            if remaining == 0 {
                self.keys.remove(&key);
                left.push(ChannelEvent::Leave { user_id: key });
                continue;
            }
            if !has_join {
                debug!(key = %key, remaining, "connection left, key still present");
            }
            if let Some(record) = parse_presence_meta(&key, &self.keys[&key]) {
                joined.push(ChannelEvent::Join {
                    user_id: key,
                    record,
                });
            }
        }
        left.append(&mut joined);
        left
    }
}
