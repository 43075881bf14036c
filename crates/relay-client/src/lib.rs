//! Room relay client.
//!
//! Holds one WebSocket connection to the signaling relay, scoped to a room,
//! and surfaces everything that happens on it as an ordered stream of
//! [`RelayEvent`]s. Messages are delivered exactly once, in the order the
//! relay sent them; nothing is deduplicated, reordered or retried.

mod client;
mod endpoint;
mod pumps;

pub use client::RelayClient;
pub use endpoint::{create_room_url, relay_ws_url};

use sendit_protocol::SignalingMessage;
use tokio_tungstenite::tungstenite;

/// Capacity of the inbound event queue.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Capacity of the outbound write queue.
pub const WRITE_BUFFER_SIZE: usize = 64;

/// Observable transitions and traffic of a relay connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The connection to the room is established.
    Opened,
    /// A signaling message from the other peer.
    Message(SignalingMessage),
    /// A relay payload that is not a valid signaling message.
    Malformed(String),
    /// The connection ended cleanly (either side closed it).
    Closed,
    /// The connection failed.
    Errored(String),
}

impl RelayEvent {
    /// `true` for the events that end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }
}

/// Errors from the relay client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sendit_protocol::ProtocolError),

    #[error("invalid relay endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("room id is required")]
    MissingRoom,

    #[error("connection closed")]
    Closed,
}
