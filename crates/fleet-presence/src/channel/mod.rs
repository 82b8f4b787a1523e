//! Presence channel client.
//!
//! Wraps one [`crate::PresenceTransport`] subscription: queues the local
//! record until the subscription is live, translates raw presence maps into
//! per-user events, and reports connection status on the same ordered
//! stream. It never reconnects by itself.

mod client;
mod event_translator;
mod types;


pub use client::PresenceChannelClient;
pub use types::ChannelEvent;
