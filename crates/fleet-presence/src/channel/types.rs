use crate::protocol::{ConnectionStatus, PresenceRecord};

/// Events emitted by [`super::PresenceChannelClient`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Authoritative snapshot; replaces everything seen before.
    Sync(Vec<PresenceRecord>),
    Join {
        user_id: String,
        record: PresenceRecord,
    },
    Leave {
        user_id: String,
    },
    /// Application event published by a peer.
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    Status(ConnectionStatus),
}
