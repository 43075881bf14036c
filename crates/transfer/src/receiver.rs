//! Receiving side: classify frames, accumulate chunks, verify, assemble.
//!
//! ```text
//! Idle --file-start--> Announced --chunk--> Accumulating --file-end--> Verifying
//! Verifying --> Idle (completed or failed, buffer cleared either way)
//! ```

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use sendit_protocol::{ControlFrame, Frame, InboundFrame, TransferConfig, TransferMetadata};

use crate::TransferError;
use crate::progress::{SpeedCalculator, TransferProgress};
use crate::registry::SharedRegistry;
use crate::session::{Direction, TransferSession, TransferState};
use crate::sink::FileSink;

/// Where the receiver is within the current transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Announced,
    Accumulating,
    Verifying,
}

/// A file handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Where the sink put it.
    pub location: String,
}

/// Result of feeding one frame (or timer / close) to the receiver.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Protocol violation or no-op; already logged.
    Ignored,
    Announced(TransferMetadata),
    Progress(TransferProgress),
    Completed(ReceivedFile),
    Failed(TransferError),
    /// A text frame that is not a control frame.
    Message(String),
}

// ---------------------------------------------------------------------------
// ChunkBuffer
// ---------------------------------------------------------------------------

/// Received chunks in arrival order plus their byte count.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    bytes: u64,
}

impl ChunkBuffer {
    pub fn push(&mut self, chunk: Vec<u8>) {
        self.bytes += chunk.len() as u64;
        self.chunks.push(chunk);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Number of chunks held.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }

    /// Concatenates the chunks in arrival order and empties the buffer.
    pub fn assemble(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::try_from(self.bytes).unwrap_or(0));
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        self.bytes = 0;
        out
    }
}

// ---------------------------------------------------------------------------
// ChunkReceiver
// ---------------------------------------------------------------------------

/// Consumes channel frames and reassembles announced files.
pub struct ChunkReceiver<K> {
    config: TransferConfig,
    registry: SharedRegistry,
    sink: K,
    state: ReceiverState,
    buffer: ChunkBuffer,
    session: Option<TransferSession>,
    speed: SpeedCalculator,
    last_activity: Option<Instant>,
}

impl<K: FileSink> ChunkReceiver<K> {
    pub fn new(config: TransferConfig, registry: SharedRegistry, sink: K) -> Self {
        Self {
            config,
            registry,
            sink,
            state: ReceiverState::Idle,
            buffer: ChunkBuffer::default(),
            session: None,
            speed: SpeedCalculator::default(),
            last_activity: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn buffered_bytes(&self) -> u64 {
        self.buffer.bytes()
    }

    /// The active inbound session, if any.
    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    /// When the active transfer is declared incomplete if nothing arrives.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ReceiverState::Announced | ReceiverState::Accumulating => self
                .last_activity
                .map(|t| t + self.config.incomplete_transfer_timeout),
            ReceiverState::Idle | ReceiverState::Verifying => None,
        }
    }

    /// Handles one frame from the channel.
    pub async fn on_frame(&mut self, frame: Frame) -> ReceiveOutcome {
        let frame = match InboundFrame::classify(frame) {
            Ok(f) => f,
            Err(e) => {
                warn!("ignoring invalid control frame: {e}");
                return ReceiveOutcome::Ignored;
            }
        };

        match frame {
            InboundFrame::Control(start @ ControlFrame::FileStart { .. }) => {
                self.on_file_start(&start).await
            }
            InboundFrame::Control(ControlFrame::FileEnd) => self.on_file_end().await,
            InboundFrame::Chunk(data) => self.on_chunk(data).await,
            InboundFrame::Message(text) => {
                debug!(len = text.len(), "peer message");
                ReceiveOutcome::Message(text)
            }
        }
    }

    /// Fails the active transfer when its inactivity deadline has passed.
    pub async fn check_timeout(&mut self, now: Instant) -> Option<ReceiveOutcome> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        warn!(
            received = self.buffer.bytes(),
            "no transfer activity within {:?}",
            self.config.incomplete_transfer_timeout
        );
        Some(self.abort().await)
    }

    /// The channel went away; an unfinished transfer is incomplete.
    pub async fn on_channel_closed(&mut self) -> Option<ReceiveOutcome> {
        if !self.session.as_ref().is_some_and(TransferSession::is_active) {
            return None;
        }
        warn!(received = self.buffer.bytes(), "channel closed mid-transfer");
        Some(self.abort().await)
    }

    async fn on_file_start(&mut self, frame: &ControlFrame) -> ReceiveOutcome {
        if self.state == ReceiverState::Accumulating {
            warn!("ignoring file-start while a transfer is in progress");
            return ReceiveOutcome::Ignored;
        }
        let metadata = match TransferMetadata::from_control(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!("ignoring file-start: {e}");
                return ReceiveOutcome::Ignored;
            }
        };
        if let Err(e) = self
            .registry
            .lock()
            .await
            .announce(Direction::Inbound, metadata.clone())
        {
            warn!("ignoring file-start: {e}");
            return ReceiveOutcome::Ignored;
        }

        info!(
            name = %metadata.name,
            size = metadata.size,
            total_chunks = metadata.total_chunks,
            "incoming file"
        );
        self.buffer.clear();
        self.speed.reset();
        self.speed.add_sample(0);
        self.session = Some(TransferSession::new(metadata.clone()));
        self.state = ReceiverState::Announced;
        self.last_activity = Some(Instant::now());
        ReceiveOutcome::Announced(metadata)
    }

    async fn on_chunk(&mut self, data: Vec<u8>) -> ReceiveOutcome {
        let Some(session) = self.session.as_mut() else {
            warn!(len = data.len(), "ignoring chunk with no announced transfer");
            return ReceiveOutcome::Ignored;
        };
        self.last_activity = Some(Instant::now());
        if data.is_empty() {
            warn!("ignoring empty chunk");
            return ReceiveOutcome::Ignored;
        }

        let n = data.len();
        let expected = session.metadata.size;
        let actual = self.buffer.bytes() + n as u64;
        if actual > expected.saturating_add(self.config.integrity_tolerance_bytes) {
            warn!(expected, actual, name = %session.metadata.name, "peer sent more than announced");
            self.reset(TransferState::Failed).await;
            return ReceiveOutcome::Failed(TransferError::SizeMismatch { expected, actual });
        }

        self.buffer.push(data);
        session.record_chunk(n);
        self.speed.add_sample(n as u64);
        self.state = ReceiverState::Accumulating;
        self.registry
            .lock()
            .await
            .record_chunk(Direction::Inbound, n);
        trace!(
            chunk = session.chunks_transferred,
            bytes = self.buffer.bytes(),
            "chunk received"
        );
        ReceiveOutcome::Progress(TransferProgress::new(Direction::Inbound, session, &self.speed))
    }

    async fn on_file_end(&mut self) -> ReceiveOutcome {
        let Some(session) = self.session.clone() else {
            warn!("ignoring file-end with no announced transfer");
            return ReceiveOutcome::Ignored;
        };
        self.state = ReceiverState::Verifying;

        let expected = session.metadata.size;
        let actual = self.buffer.bytes();
        if actual == 0 || actual.abs_diff(expected) > self.config.integrity_tolerance_bytes {
            warn!(expected, actual, name = %session.metadata.name, "size mismatch");
            self.reset(TransferState::Failed).await;
            return ReceiveOutcome::Failed(TransferError::SizeMismatch { expected, actual });
        }

        let data = self.buffer.assemble();
        let result = self
            .sink
            .save(&session.metadata.name, &session.metadata.mime_type, data)
            .await;
        match result {
            Ok(location) => {
                info!(name = %session.metadata.name, size = actual, %location, "file received");
                self.reset(TransferState::Completed).await;
                ReceiveOutcome::Completed(ReceivedFile {
                    name: session.metadata.name,
                    mime_type: session.metadata.mime_type,
                    size: actual,
                    location,
                })
            }
            Err(e) => {
                warn!("saving received file failed: {e}");
                self.reset(TransferState::Failed).await;
                ReceiveOutcome::Failed(e)
            }
        }
    }

    async fn abort(&mut self) -> ReceiveOutcome {
        let expected = self.session.as_ref().map_or(0, |s| s.metadata.size);
        let received = self.buffer.bytes();
        self.reset(TransferState::Failed).await;
        ReceiveOutcome::Failed(TransferError::IncompleteTransfer { expected, received })
    }

    /// Clears all per-transfer state, whatever the result.
    async fn reset(&mut self, result: TransferState) {
        self.buffer.clear();
        self.speed.reset();
        self.session = None;
        self.last_activity = None;
        self.state = ReceiverState::Idle;
        self.registry
            .lock()
            .await
            .finish(Direction::Inbound, result);
    }
}
