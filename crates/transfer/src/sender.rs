//! Sending side: `file-start`, sequential chunks, `file-end`.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use sendit_protocol::{ControlFrame, TransferConfig, TransferMetadata};

use crate::TransferError;
use crate::channel::DataChannel;
use crate::progress::{SpeedCalculator, TransferProgress};
use crate::registry::SharedRegistry;
use crate::session::{Direction, TransferSession, TransferState};
use crate::source::FileSource;

/// Streams one file at a time over a [`DataChannel`].
pub struct ChunkSender {
    config: TransferConfig,
    registry: SharedRegistry,
    progress_tx: Option<mpsc::Sender<TransferProgress>>,
    cancel: CancellationToken,
}

impl ChunkSender {
    pub fn new(config: TransferConfig, registry: SharedRegistry) -> Self {
        Self {
            config,
            registry,
            progress_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Reports progress after every chunk. Reports are dropped, not
    /// awaited, when the receiver lags.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token aborting the transfer in flight.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sends `source` over `channel`.
    ///
    /// `file-end` goes out only once every chunk has left the local buffer.
    /// On any write error or cancellation before that the session ends
    /// `Failed` and no `file-end` is sent; the peer sees an incomplete
    /// transfer.
    pub async fn send<C, S>(&self, channel: &C, source: &S) -> Result<TransferSession, TransferError>
    where
        C: DataChannel + ?Sized,
        S: FileSource + ?Sized,
    {
        if !channel.is_open() {
            return Err(TransferError::ChannelNotReady);
        }
        let size = source.size();
        if size == 0 {
            return Err(TransferError::EmptyFile);
        }
        let metadata = TransferMetadata::new(
            source.name(),
            size,
            source.mime_type(),
            self.config.chunk_size,
        )?;

        self.registry
            .lock()
            .await
            .announce(Direction::Outbound, metadata.clone())?;
        info!(
            name = %metadata.name,
            size,
            total_chunks = metadata.total_chunks,
            "sending file"
        );

        let mut session = TransferSession::new(metadata);
        let result = self.stream(channel, source, &mut session).await;

        let mut registry = self.registry.lock().await;
        match result {
            Ok(()) => {
                session.complete();
                registry.finish(Direction::Outbound, session.state);
                info!(
                    name = %session.metadata.name,
                    bytes = session.bytes_transferred,
                    "file sent"
                );
                Ok(session)
            }
            Err(e) => {
                session.fail();
                registry.finish(Direction::Outbound, session.state);
                warn!(
                    name = %session.metadata.name,
                    bytes = session.bytes_transferred,
                    "send failed: {e}"
                );
                Err(e)
            }
        }
    }

    async fn stream<C, S>(
        &self,
        channel: &C,
        source: &S,
        session: &mut TransferSession,
    ) -> Result<(), TransferError>
    where
        C: DataChannel + ?Sized,
        S: FileSource + ?Sized,
    {
        let size = session.metadata.size;
        let start = ControlFrame::start(&session.metadata).to_text()?;
        let mut speed = SpeedCalculator::default();

        channel.send_text(start).await?;
        speed.add_sample(0);

        let chunk_size = self.config.chunk_size as u64;
        let mut offset = 0u64;
        while offset < size {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            // Bounded by chunk_size, which is a usize.
            let len = chunk_size.min(size - offset) as usize;
            let data = source.read_at(offset, len).await?;
            if data.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("source ended at {offset} of {size} bytes"),
                )
                .into());
            }
            let n = data.len();
            channel.send_binary(data).await?;

            offset += n as u64;
            session.record_chunk(n);
            speed.add_sample(n as u64);
            self.registry
                .lock()
                .await
                .record_chunk(Direction::Outbound, n);
            trace!(
                chunk = session.chunks_transferred,
                total = session.metadata.total_chunks,
                bytes = n,
                "chunk sent"
            );
            self.report(session, &speed);

            if offset < size && !self.config.inter_chunk_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                    _ = tokio::time::sleep(self.config.inter_chunk_delay) => {}
                }
            }
        }

        channel.flush().await?;
        channel.send_text(ControlFrame::FileEnd.to_text()?).await?;
        debug!(name = %session.metadata.name, "file-end sent");

        // The peer has the whole file once file-end is queued.
        if let Err(e) = channel.flush().await {
            warn!(name = %session.metadata.name, "flush after file-end failed: {e}");
        }
        Ok(())
    }

    fn report(&self, session: &TransferSession, speed: &SpeedCalculator) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(TransferProgress::new(Direction::Outbound, session, speed));
        }
    }
}
