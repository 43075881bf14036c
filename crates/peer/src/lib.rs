//! One peer of a room, end to end.
//!
//! [`Peer`] merges the relay connection, the negotiation transport and the
//! transfer channel into a single event loop. Commands come in through a
//! [`PeerHandle`]; everything observable comes out as [`PeerEvent`]s.

mod event;
mod handle;
mod peer;
mod signal;

pub use event::PeerEvent;
pub use handle::PeerHandle;
pub use peer::{Peer, PeerConfig};
pub use signal::{CloseFuture, SignalError, SignalFuture, SignalSink};

/// Capacity of the outbound [`PeerEvent`] queue.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Capacity of the command queue behind a [`PeerHandle`].
pub const COMMAND_BUFFER_SIZE: usize = 32;

/// Errors returned by [`PeerHandle`].
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer task has stopped")]
    Stopped,
}
