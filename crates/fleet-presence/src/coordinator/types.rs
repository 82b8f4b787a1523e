use crate::network::NetworkQuality;
use crate::reconnect::Backoff;

/// Channel topic used when none is configured.
pub const DEFAULT_CHANNEL: &str = "fleet-presence";

/// Static settings for a [`super::PresenceCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSettings {
    /// Topic every fleet member subscribes to.
    pub channel: String,
    pub backoff: Backoff,
    /// Initial quality; `set_network_quality` changes it later.
    pub network_quality: NetworkQuality,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            backoff: Backoff::default(),
            network_quality: NetworkQuality::Unknown,
        }
    }
}

/// An application event a peer published on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Requests from timers to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopCommand {
    Reconnect,
}
