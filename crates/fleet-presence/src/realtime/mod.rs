//! Supabase Realtime transport over the Phoenix Channels v1 protocol.
//!
//! Each subscription owns one WebSocket session: it joins the channel with
//! the caller's presence key, keeps the socket alive with Phoenix
//! heartbeats and turns `presence_state`/`presence_diff` frames into
//! [`crate::TransportEvent`]s. Reconnection is not handled here; a dead
//! session simply reports `Closed` and the presence layer decides when to
//! subscribe again.

mod connection;
mod handler;
mod transport;
mod types;

pub use transport::RealtimeTransport;
pub use types::{PhoenixMessage, RealtimeConfig};
