//! The relay's send side, as the peer sees it.

use std::future::Future;
use std::pin::Pin;

use sendit_protocol::SignalingMessage;
use sendit_relay_client::{RelayClient, RelayError};

pub type SignalFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SignalError>> + Send + 'a>>;

pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("signal sink closed")]
    Closed,
}

/// Delivers signaling messages to the other peer of the room.
pub trait SignalSink: Send + Sync + 'static {
    fn send_signal(&self, msg: SignalingMessage) -> SignalFuture<'_>;

    /// Leaves the room. Idempotent.
    fn close(&self) -> CloseFuture<'_>;
}

impl SignalSink for RelayClient {
    fn send_signal(&self, msg: SignalingMessage) -> SignalFuture<'_> {
        Box::pin(async move { self.send(&msg).await.map_err(SignalError::from) })
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(RelayClient::close(self))
    }
}
