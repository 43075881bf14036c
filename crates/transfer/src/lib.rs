//! Chunked file transfer over an established peer channel.
//!
//! The sender announces a file with a `file-start` control frame, streams it
//! as fixed-size binary frames and closes with `file-end`. The receiver
//! accumulates the binary frames, checks the byte count against the
//! announcement and hands the assembled file to a [`FileSink`].
//!
//! Frames carry no sequence numbers: correctness relies on the channel
//! being reliable and ordered.

mod channel;
mod progress;
mod receiver;
mod registry;
mod sender;
mod session;
mod sink;
mod source;
mod validation;

pub use channel::{ChannelError, ChannelFuture, DataChannel, MemoryChannel};
pub use progress::{SpeedCalculator, TransferProgress};
pub use receiver::{ChunkBuffer, ChunkReceiver, ReceiveOutcome, ReceivedFile, ReceiverState};
pub use registry::{SessionRegistry, SharedRegistry};
pub use sender::ChunkSender;
pub use session::{Direction, TransferSession, TransferState};
pub use sink::{DirectorySink, FileSink, MemorySink, SaveFuture, StoredFile};
pub use source::{FileSource, FsSource, MemorySource, ReadFuture};
pub use validation::sanitize_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sendit_protocol::ProtocolError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("channel is not open")]
    ChannelNotReady,

    #[error("cannot send an empty file")]
    EmptyFile,

    #[error("a {0} transfer is already in progress")]
    SessionActive(Direction),

    #[error("size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("incomplete transfer: received {received} of {expected} bytes")]
    IncompleteTransfer { expected: u64, received: u64 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid file name: {0}")]
    InvalidName(String),
}
