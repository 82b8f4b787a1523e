//! Presence wire types and connection status.
//!
//! A [`PresenceRecord`] is what rides inside the transport's presence
//! metas; [`OnlineUser`] is the store's derived view of it.

use serde::{Deserialize, Serialize};

/// Broadcast event names published on the presence channel.
pub mod events {
    pub const ROOM_CHANGED: &str = "room_changed";
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One presence announcement for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// `None` means online but not in any room.
    #[serde(default)]
    pub room_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl PresenceRecord {
    pub fn new(
        user_id: String,
        username: String,
        display_name: String,
        avatar_ref: Option<String>,
        room_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            username,
            display_name,
            avatar_ref,
            room_id,
            timestamp: now_millis(),
        }
    }

    /// Copy of this record stamped with the current time. Never moves the
    /// timestamp backwards, even if the wall clock does.
    pub fn refreshed(&self) -> Self {
        Self {
            timestamp: now_millis().max(self.timestamp),
            ..self.clone()
        }
    }
}

/// A user the store currently considers online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub room_id: Option<String>,
    /// Timestamp of the most recent announcement received.
    pub last_seen: i64,
}

impl From<PresenceRecord> for OnlineUser {
    fn from(record: PresenceRecord) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username,
            display_name: record.display_name,
            avatar_ref: record.avatar_ref,
            room_id: record.room_id,
            last_seen: record.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// State of the presence subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Whether the local user wants to be visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("invalid presence status: {s}")),
        }
    }
}
