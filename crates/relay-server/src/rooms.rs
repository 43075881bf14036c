//! Room membership and message fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::ROOM_CAPACITY;

/// Identifies one connection within the relay.
pub type ParticipantId = u64;

/// Why a connection cannot join a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room not found")]
    UnknownRoom,

    #[error("room is full")]
    RoomFull,
}

impl IntoResponse for JoinError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::UnknownRoom => StatusCode::NOT_FOUND,
            Self::RoomFull => StatusCode::CONFLICT,
        };
        (status, self.to_string()).into_response()
    }
}

struct Participant {
    id: ParticipantId,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Vec<Participant>>,
    next_id: ParticipantId,
}

/// All open rooms. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a room with a fresh random id.
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.open(&id).await;
        id
    }

    /// Opens a room under a caller-chosen id. No-op if it already exists.
    pub async fn open(&self, room_id: &str) {
        let mut inner = self.inner.lock().await;
        if !inner.rooms.contains_key(room_id) {
            info!(room = %room_id, "room created");
            inner.rooms.insert(room_id.to_string(), Vec::new());
        }
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.inner.lock().await.rooms.contains_key(room_id)
    }

    /// Number of connected participants, `None` for an unknown room.
    pub async fn participants(&self, room_id: &str) -> Option<usize> {
        self.inner.lock().await.rooms.get(room_id).map(Vec::len)
    }

    /// Checks whether a join would currently succeed.
    pub async fn check(&self, room_id: &str) -> Result<(), JoinError> {
        let inner = self.inner.lock().await;
        let members = inner.rooms.get(room_id).ok_or(JoinError::UnknownRoom)?;
        if members.len() >= ROOM_CAPACITY {
            return Err(JoinError::RoomFull);
        }
        Ok(())
    }

    /// Adds a participant. Returns its id and the queue of messages the
    /// other participant sends.
    pub async fn join(
        &self,
        room_id: &str,
    ) -> Result<(ParticipantId, mpsc::UnboundedReceiver<String>), JoinError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        let members = inner.rooms.get_mut(room_id).ok_or(JoinError::UnknownRoom)?;
        if members.len() >= ROOM_CAPACITY {
            return Err(JoinError::RoomFull);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        members.push(Participant { id, tx });
        let count = members.len();
        inner.next_id += 1;
        info!(room = %room_id, participant = id, count, "participant joined");
        Ok((id, rx))
    }

    /// Delivers `text` to every participant of the room except `from`.
    ///
    /// Returns how many participants it reached.
    pub async fn forward(&self, room_id: &str, from: ParticipantId, text: &str) -> usize {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(room_id) else {
            return 0;
        };
        let mut delivered = 0;
        for member in members.iter().filter(|p| p.id != from) {
            if member.tx.send(text.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Removes a participant; the room goes away with its last member.
    pub async fn leave(&self, room_id: &str, id: ParticipantId) {
        let mut inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get_mut(room_id) else {
            return;
        };
        members.retain(|p| p.id != id);
        debug!(room = %room_id, participant = id, "participant left");
        if members.is_empty() {
            inner.rooms.remove(room_id);
            info!(room = %room_id, "room closed");
        }
    }
}
