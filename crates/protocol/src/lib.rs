//! Wire protocol types for SendIt.
//!
//! Two wire formats live here:
//!
//! - signaling messages exchanged through the room relay
//!   ([`SignalingMessage`]), JSON text, one object per message;
//! - frames exchanged over the established peer channel ([`Frame`]):
//!   JSON control frames (`file-start` / `file-end`) as text and raw chunk
//!   bytes as binary.

pub mod constants;
pub mod frames;
pub mod signaling;
pub mod types;

pub use constants::{CHUNK_SIZE, total_chunks};
pub use frames::{ControlFrame, Frame, InboundFrame};
pub use signaling::{CreateRoomResponse, IceCandidate, SignalingMessage};
pub use types::{NegotiationConfig, TransferConfig, TransferMetadata};

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("invalid transfer metadata: {0}")]
    InvalidMetadata(String),
}
