//! Online presence coordination.
//!
//! Tracks which users are connected and which room each one is active in,
//! over a publish/subscribe transport that may drop, degrade or disconnect.
//! [`PresenceCoordinator`] is the entry point; the components it wires
//! together are public so hosts can drive them individually.

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod network;
pub mod protocol;
pub mod realtime;
pub mod reconnect;
pub mod store;
pub mod transport;

pub use channel::{ChannelEvent, PresenceChannelClient};
pub use coordinator::{PeerEvent, PresenceCoordinator, PresenceSettings};
pub use error::{ConnectError, PresenceError, TerminalError, TrackError, TransportError};
pub use heartbeat::HeartbeatScheduler;
pub use identity::Identity;
pub use network::{NetworkQuality, NetworkQualityMonitor, PresenceConfig};
pub use protocol::{ConnectionStatus, OnlineUser, PresenceRecord, PresenceStatus};
pub use realtime::{RealtimeConfig, RealtimeTransport};
pub use reconnect::{Backoff, ReconnectDecision, ReconnectionManager};
pub use store::{PresenceStateStore, StoreChange};
pub use transport::{MemoryHub, MemoryTransport, PresenceMap, PresenceTransport, TransportEvent};
