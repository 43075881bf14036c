//! The peer channel as seen by the transfer layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;

use sendit_protocol::Frame;

/// A boxed future returned by channel methods.
pub type ChannelFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

/// Errors reported by a [`DataChannel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    NotOpen,

    #[error("channel closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// One reliable, ordered, message-oriented channel carrying text and binary
/// frames.
pub trait DataChannel: Send + Sync {
    fn is_open(&self) -> bool;

    fn send_text(&self, text: String) -> ChannelFuture<'_>;

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_>;

    /// Resolves once everything sent so far has left the local buffer.
    fn flush(&self) -> ChannelFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn send_frame(&self, frame: Frame) -> ChannelFuture<'_> {
        match frame {
            Frame::Text(text) => self.send_text(text),
            Frame::Binary(data) => self.send_binary(data),
        }
    }
}

/// In-process channel delivering frames to an unbounded receiver.
///
/// Can be told to start failing after a number of binary frames or flushes,
/// which is how a broken link looks to the sender.
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Frame>,
    open: AtomicBool,
    binary_sent: AtomicUsize,
    binary_limit: AtomicUsize,
    flushes: AtomicUsize,
    flush_limit: AtomicUsize,
}

impl MemoryChannel {
    /// Creates an open channel and the receiving end of its frames.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            tx,
            open: AtomicBool::new(true),
            binary_sent: AtomicUsize::new(0),
            binary_limit: AtomicUsize::new(usize::MAX),
            flushes: AtomicUsize::new(0),
            flush_limit: AtomicUsize::new(usize::MAX),
        };
        (channel, rx)
    }

    /// Binary sends after the first `n` fail with [`ChannelError::Closed`].
    pub fn fail_after_binary(&self, n: usize) {
        self.binary_limit.store(n, Ordering::SeqCst);
    }

    /// Flushes after the first `n` fail with [`ChannelError::Closed`].
    pub fn fail_flush_after(&self, n: usize) {
        self.flush_limit.store(n, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn deliver(&self, frame: Frame) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }
}

impl DataChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn send_text(&self, text: String) -> ChannelFuture<'_> {
        Box::pin(async move { self.deliver(Frame::Text(text)) })
    }

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_> {
        Box::pin(async move {
            let sent = self.binary_sent.fetch_add(1, Ordering::SeqCst);
            if sent >= self.binary_limit.load(Ordering::SeqCst) {
                self.close();
                return Err(ChannelError::Closed);
            }
            self.deliver(Frame::Binary(data))
        })
    }

    fn flush(&self) -> ChannelFuture<'_> {
        Box::pin(async move {
            let done = self.flushes.fetch_add(1, Ordering::SeqCst);
            if done >= self.flush_limit.load(Ordering::SeqCst) {
                return Err(ChannelError::Closed);
            }
            Ok(())
        })
    }
}

impl<T: DataChannel + ?Sized> DataChannel for Arc<T> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send_text(&self, text: String) -> ChannelFuture<'_> {
        (**self).send_text(text)
    }

    fn send_binary(&self, data: Vec<u8>) -> ChannelFuture<'_> {
        (**self).send_binary(data)
    }

    fn flush(&self) -> ChannelFuture<'_> {
        (**self).flush()
    }

    fn send_frame(&self, frame: Frame) -> ChannelFuture<'_> {
        (**self).send_frame(frame)
    }
}
