//! Error taxonomy for the presence system.
//!
//! Transport failures are caught at the channel client and turned into
//! status events; none of these errors ever reach store queries.

use std::time::Duration;

/// Failure reported by a [`crate::PresenceTransport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport closed")]
    Closed,

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}

/// The subscription could not be established. Recoverable through backoff.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no local identity, presence is disabled")]
    NoIdentity,

    #[error("presence client has been shut down")]
    ShutDown,
}

/// A single announce or removal failed. The next heartbeat retries it.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode presence record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("presence client has been shut down")]
    ShutDown,
}

/// Reconnection gave up. Only an explicit `reconnect()` recovers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("gave up reconnecting after {retries} consecutive failures")]
pub struct TerminalError {
    pub retries: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Track(#[from] TrackError),
}

impl From<PresenceError> for fleet_common::FleetError {
    fn from(err: PresenceError) -> Self {
        fleet_common::FleetError::Presence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_wraps_transport() {
        let err: ConnectError = TransportError::Connect("refused".into()).into();
        assert_eq!(err.to_string(), "connection failed: refused");
    }

    #[test]
    fn terminal_error_display() {
        let err = TerminalError { retries: 3 };
        assert_eq!(
            err.to_string(),
            "gave up reconnecting after 3 consecutive failures"
        );
    }

    #[test]
    fn presence_error_converts_to_fleet_error() {
        let err = PresenceError::from(TrackError::ShutDown);
        let fleet: fleet_common::FleetError = err.into();
        assert!(matches!(fleet, fleet_common::FleetError::Presence(_)));
        assert!(fleet.to_string().contains("shut down"));
    }

    #[test]
    fn timeout_display_includes_duration() {
        let err = TransportError::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "connection timed out after 15s");
    }
}
