//! WebRTC implementation of the peer transport.
//!
//! [`RtcTransport`] drives one `RTCPeerConnection` for the negotiation
//! machine and reports ICE and data channel activity as
//! [`TransportEvent`](sendit_negotiation::TransportEvent)s. [`RtcChannel`]
//! is the data channel as seen by the transfer layer.

mod channel;
mod convert;
mod transport;

pub use channel::RtcChannel;
pub use transport::{RtcConfig, RtcTransport};

/// Default STUN server used when none is configured.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Errors produced by the WebRTC adapter.
#[derive(Debug, thiserror::Error)]
pub enum RtcError {
    #[error("WebRTC error: {0}")]
    Webrtc(#[from] webrtc::Error),

    #[error("no local description after negotiation step")]
    MissingLocalDescription,
}

impl From<RtcError> for sendit_negotiation::TransportError {
    fn from(e: RtcError) -> Self {
        Self::new(e.to_string())
    }
}
