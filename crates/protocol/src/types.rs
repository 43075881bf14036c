use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::{
    CHUNK_SIZE, DEFAULT_INCOMPLETE_TRANSFER_TIMEOUT, DEFAULT_INTER_CHUNK_DELAY,
    DEFAULT_NEGOTIATION_TIMEOUT, LEGACY_INTEGRITY_TOLERANCE_BYTES, total_chunks,
};
use crate::frames::ControlFrame;

/// Description of a file announced with `file-start`. Immutable once announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub name: String,
    /// Size in bytes, always > 0.
    pub size: u64,
    pub mime_type: String,
    /// `ceil(size / chunk_size)`.
    pub total_chunks: u32,
}

impl TransferMetadata {
    /// Builds metadata for a file of `size` bytes sent in `chunk_size` slices.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        chunk_size: usize,
    ) -> Result<Self, ProtocolError> {
        if size == 0 {
            return Err(ProtocolError::InvalidMetadata("file is empty".into()));
        }
        if chunk_size == 0 {
            return Err(ProtocolError::InvalidMetadata("chunk size is zero".into()));
        }
        Ok(Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            total_chunks: total_chunks(size, chunk_size),
        })
    }

    /// Extracts metadata from a `file-start` frame.
    ///
    /// `totalChunks` is taken as announced; only `size` is validated.
    pub fn from_control(frame: &ControlFrame) -> Result<Self, ProtocolError> {
        match frame {
            ControlFrame::FileStart {
                name,
                size,
                file_type,
                total_chunks,
            } => {
                if *size == 0 {
                    return Err(ProtocolError::InvalidMetadata(
                        "announced size is zero".into(),
                    ));
                }
                Ok(Self {
                    name: name.clone(),
                    size: *size,
                    mime_type: file_type.clone(),
                    total_chunks: *total_chunks,
                })
            }
            ControlFrame::FileEnd => Err(ProtocolError::InvalidMetadata(
                "file-end carries no metadata".into(),
            )),
        }
    }
}

/// Tunables of the chunked transfer layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Bytes per binary frame.
    pub chunk_size: usize,
    /// Accepted `|received - declared|` at `file-end`.
    pub integrity_tolerance_bytes: u64,
    /// Pause between two binary frames.
    pub inter_chunk_delay: Duration,
    /// Inactivity after which an announced inbound transfer is incomplete.
    pub incomplete_transfer_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            integrity_tolerance_bytes: 0,
            inter_chunk_delay: DEFAULT_INTER_CHUNK_DELAY,
            incomplete_transfer_timeout: DEFAULT_INCOMPLETE_TRANSFER_TIMEOUT,
        }
    }
}

impl TransferConfig {
    /// Settings matching the browser client, including its ±1 byte tolerance.
    pub fn legacy() -> Self {
        Self {
            integrity_tolerance_bytes: LEGACY_INTEGRITY_TOLERANCE_BYTES,
            ..Self::default()
        }
    }
}

/// Tunables of the negotiation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationConfig {
    /// Bound on the offer/answer exchange once started.
    pub timeout: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }
}
