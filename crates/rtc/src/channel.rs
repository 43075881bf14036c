use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

use sendit_transfer::{ChannelError, ChannelFuture, DataChannel};

/// Polling interval while waiting for the send buffer to drain.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Upper bound on waiting for the send buffer to drain.
const DRAIN_MAX_POLLS: u32 = 500;

/// An open `RTCDataChannel`.
#[derive(Clone)]
pub struct RtcChannel {
    dc: Arc<RTCDataChannel>,
}

impl RtcChannel {
    pub(crate) fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }

    pub fn label(&self) -> &str {
        self.dc.label()
    }

    /// Bytes queued locally and not yet handed to the network.
    pub async fn buffered_amount(&self) -> usize {
        self.dc.buffered_amount().await
    }

    pub async fn close(&self) {
        if let Err(e) = self.dc.close().await {
            debug!("data channel close: {e}");
        }
    }
}

impl DataChannel for RtcChannel {
    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    fn send_text(&self, text: String) -> ChannelFuture<'_> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(ChannelError::NotOpen);
            }
            self.dc
                .send_text(text)
                .await
                .map(|_| ())
                .map_err(|e| ChannelError::Send(e.to_string()))
        })
    }

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(ChannelError::NotOpen);
            }
            self.dc
                .send(&Bytes::from(data))
                .await
                .map(|_| ())
                .map_err(|e| ChannelError::Send(e.to_string()))
        })
    }

    /// Waits until the send buffer is empty or the channel stops being open.
    fn flush(&self) -> ChannelFuture<'_> {
        Box::pin(async move {
            for _ in 0..DRAIN_MAX_POLLS {
                if self.dc.ready_state() != RTCDataChannelState::Open {
                    return Err(ChannelError::Closed);
                }
                if self.dc.buffered_amount().await == 0 {
                    return Ok(());
                }
                tokio::time::sleep(DRAIN_POLL).await;
            }
            debug!("data channel still buffering after drain wait");
            Ok(())
        })
    }
}
