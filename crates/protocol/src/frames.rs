//! Frames exchanged over the established peer channel.
//!
//! ```text
//! text  : { "type": "file-start", "name", "size", "fileType", "totalChunks" }
//! binary: <raw chunk bytes>, at most CHUNK_SIZE each, in send order
//! text  : { "type": "file-end" }
//! ```
//!
//! Text frames that are not control frames are plain peer messages.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::types::TransferMetadata;

/// A control frame, sent as a text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    #[serde(rename = "file-start", rename_all = "camelCase")]
    FileStart {
        name: String,
        size: u64,
        file_type: String,
        total_chunks: u32,
    },
    #[serde(rename = "file-end")]
    FileEnd,
}

impl ControlFrame {
    /// Builds the `file-start` frame announcing `metadata`.
    pub fn start(metadata: &TransferMetadata) -> Self {
        Self::FileStart {
            name: metadata.name.clone(),
            size: metadata.size,
            file_type: metadata.mime_type.clone(),
            total_chunks: metadata.total_chunks,
        }
    }

    /// Serializes the frame as channel text.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One discrete message unit on the peer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A frame after classification by the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Control(ControlFrame),
    Chunk(Vec<u8>),
    /// Text that is not a control frame.
    Message(String),
}

impl InboundFrame {
    /// Classifies a raw channel frame.
    ///
    /// Text is a control frame only when it is a JSON object whose `type` is
    /// `file-start` or `file-end`; a control frame with missing or invalid
    /// fields is an error. Any other text is a plain message.
    pub fn classify(frame: Frame) -> Result<Self, ProtocolError> {
        match frame {
            Frame::Binary(data) => Ok(Self::Chunk(data)),
            Frame::Text(text) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => return Ok(Self::Message(text)),
                };
                match value.get("type").and_then(|t| t.as_str()) {
                    Some("file-start" | "file-end") => {
                        Ok(Self::Control(serde_json::from_value(value)?))
                    }
                    _ => Ok(Self::Message(text)),
                }
            }
        }
    }
}
