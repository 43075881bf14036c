use std::fmt;

use sendit_protocol::TransferMetadata;

/// Which side of the channel a transfer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => f.write_str("outbound"),
            Self::Inbound => f.write_str("inbound"),
        }
    }
}

/// Lifecycle of a single file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Announced,
    InProgress,
    Completed,
    Failed,
}

/// Counters and state of one file transfer in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSession {
    pub metadata: TransferMetadata,
    pub bytes_transferred: u64,
    pub chunks_transferred: u32,
    pub state: TransferState,
}

impl TransferSession {
    pub fn new(metadata: TransferMetadata) -> Self {
        Self {
            metadata,
            bytes_transferred: 0,
            chunks_transferred: 0,
            state: TransferState::Announced,
        }
    }

    /// Counts one chunk of `len` bytes.
    pub fn record_chunk(&mut self, len: usize) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(len as u64);
        self.chunks_transferred = self.chunks_transferred.saturating_add(1);
        if self.state == TransferState::Announced {
            self.state = TransferState::InProgress;
        }
    }

    /// `bytes / size`, capped at 1.0.
    pub fn progress(&self) -> f64 {
        if self.metadata.size == 0 {
            return 0.0;
        }
        (self.bytes_transferred as f64 / self.metadata.size as f64).min(1.0)
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.metadata.size.saturating_sub(self.bytes_transferred)
    }

    pub fn complete(&mut self) {
        self.state = TransferState::Completed;
    }

    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }

    /// `true` while announced or in progress.
    pub fn is_active(&self) -> bool {
        matches!(self.state, TransferState::Announced | TransferState::InProgress)
    }
}
