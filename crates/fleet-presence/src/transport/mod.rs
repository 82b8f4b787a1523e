//! The narrow pub/sub contract the presence core depends on.
//!
//! Two implementations ship with the crate: [`crate::RealtimeTransport`]
//! speaks Phoenix channels over a WebSocket, and [`MemoryTransport`] is an
//! in-process hub for tests and single-process deployments.

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use memory::{MemoryHub, MemoryTransport};

/// Presence key -> metas announced under that key.
pub type PresenceMap = HashMap<String, Vec<serde_json::Value>>;

/// Events delivered on a subscription.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Authoritative full presence snapshot.
    Sync(PresenceMap),
    /// Incremental presence change.
    Diff {
        joins: PresenceMap,
        leaves: PresenceMap,
    },
    /// A broadcast published by another client.
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    /// The subscription ended.
    Closed,
    /// The subscription failed.
    Error(String),
}

#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Open a subscription to `topic`, announcing presence under `presence_key`.
    /// A fresh `Sync` is delivered once the subscription is live.
    async fn subscribe(
        &self,
        topic: &str,
        presence_key: &str,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Leave `topic`. Never fails; an already closed subscription is a no-op.
    async fn unsubscribe(&self, topic: &str);

    async fn publish(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;

    async fn track(&self, topic: &str, payload: serde_json::Value) -> Result<(), TransportError>;

    async fn untrack(&self, topic: &str) -> Result<(), TransportError>;
}
