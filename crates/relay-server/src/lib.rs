//! Signaling relay for SendIt.
//!
//! Rooms hold at most two participants. Every valid signaling message a
//! participant sends is forwarded verbatim to the other one; the relay never
//! inspects SDP or candidates beyond checking the message type.

mod rooms;
mod routes;
mod server;

pub use rooms::{JoinError, ParticipantId, RoomRegistry};
pub use routes::router;
pub use server::{RelayServer, ServerConfig};

/// Participants allowed in one room.
pub const ROOM_CAPACITY: usize = 2;

/// Port the relay listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
