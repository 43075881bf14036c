//! Signaling messages carried by the room relay.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// An ICE candidate in the browser `RTCIceCandidateInit` JSON shape.
///
/// The core never interprets the candidate; it is handed verbatim to the
/// transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// A message exchanged between the two peers of a room through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    #[serde(rename = "offer")]
    Offer {
        sdp: String,
        /// Random per-peer id used to break offer collisions.
        #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "ice_candidate")]
    IceCandidate { candidate: IceCandidate },
}

impl SignalingMessage {
    /// Parses one relay text message.
    ///
    /// Unknown `type` values are reported as
    /// [`ProtocolError::UnknownMessageType`] rather than a generic JSON error.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("offer" | "answer" | "ice_candidate") => Ok(serde_json::from_value(value)?),
            Some(other) => Err(ProtocolError::UnknownMessageType(other.to_string())),
            None => Err(ProtocolError::UnknownMessageType(String::new())),
        }
    }

    /// Serializes the message for the relay.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
        }
    }
}

/// Body of the relay's room allocation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
}
