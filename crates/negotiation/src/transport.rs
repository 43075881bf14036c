//! Capability the negotiation drives: one peer connection carrying one
//! reliable, ordered channel.

use std::future::Future;
use std::pin::Pin;

use sendit_protocol::{Frame, IceCandidate};

/// A boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Error reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Peer connection operations used by [`NegotiationSession`](crate::NegotiationSession).
///
/// Implementations report asynchronous happenings (gathered candidates,
/// channel lifecycle) as [`TransportEvent`]s on a queue of their own.
pub trait PeerTransport: Send + Sync + 'static {
    /// Handle to the established channel.
    type Channel: Clone + Send + Sync + 'static;

    /// Creates the local offer (and, on the offerer, the data channel).
    fn create_offer(&self) -> TransportFuture<'_, String>;

    /// Applies a remote offer and returns the local answer.
    fn accept_offer(&self, sdp: String) -> TransportFuture<'_, String>;

    /// Applies the remote answer.
    fn accept_answer(&self, sdp: String) -> TransportFuture<'_, ()>;

    /// Adds a remote candidate. Only called once a remote description exists.
    fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportFuture<'_, ()>;

    /// Discards the current connection and local offer, keeping the
    /// transport usable for answering.
    fn reset(&self) -> TransportFuture<'_, ()>;

    /// The channel, once open.
    fn channel(&self) -> Option<Self::Channel>;

    /// Tears the connection down.
    fn close(&self) -> TransportFuture<'_, ()>;
}

/// Things a transport reports on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A local ICE candidate to forward to the remote peer.
    LocalCandidate(IceCandidate),
    /// The peer connection failed.
    ConnectionFailed(String),
    /// The data channel is open and usable.
    ChannelOpen,
    /// A frame arrived on the data channel.
    ChannelMessage(Frame),
    /// The data channel closed.
    ChannelClosed,
}
