//! At most one inbound and one outbound transfer per channel.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use sendit_protocol::TransferMetadata;

use crate::TransferError;
use crate::session::{Direction, TransferSession, TransferState};

/// Registry shared between the sender task and the receiver.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// Active transfers of one channel, one slot per direction.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    outbound: Option<TransferSession>,
    inbound: Option<TransferSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry ready to be shared.
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn get(&self, direction: Direction) -> Option<&TransferSession> {
        self.slot(direction).as_ref()
    }

    /// Starts a session for `metadata`, replacing an idle announced one.
    ///
    /// Fails with [`TransferError::SessionActive`] while the slot's session
    /// is in progress.
    pub fn announce(
        &mut self,
        direction: Direction,
        metadata: TransferMetadata,
    ) -> Result<&TransferSession, TransferError> {
        let slot = self.slot_mut(direction);
        if slot
            .as_ref()
            .is_some_and(|s| s.state == TransferState::InProgress)
        {
            return Err(TransferError::SessionActive(direction));
        }
        debug!(%direction, name = %metadata.name, "transfer announced");
        Ok(&*slot.insert(TransferSession::new(metadata)))
    }

    /// Counts a chunk on the active session of `direction`.
    pub fn record_chunk(&mut self, direction: Direction, len: usize) -> Option<&TransferSession> {
        let session = self.slot_mut(direction).as_mut()?;
        session.record_chunk(len);
        Some(&*session)
    }

    /// Ends the session of `direction` with `state` and removes it.
    pub fn finish(&mut self, direction: Direction, state: TransferState) -> Option<TransferSession> {
        let mut session = self.slot_mut(direction).take()?;
        session.state = state;
        debug!(%direction, ?state, "transfer finished");
        Some(session)
    }

    /// `true` when neither direction has a session.
    pub fn is_idle(&self) -> bool {
        self.outbound.is_none() && self.inbound.is_none()
    }

    /// Drops both sessions (channel gone).
    pub fn clear(&mut self) {
        self.outbound = None;
        self.inbound = None;
    }

    fn slot(&self, direction: Direction) -> &Option<TransferSession> {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    fn slot_mut(&mut self, direction: Direction) -> &mut Option<TransferSession> {
        match direction {
            Direction::Outbound => &mut self.outbound,
            Direction::Inbound => &mut self.inbound,
        }
    }
}
