use std::time::Duration;

use crate::state::NegotiationState;
use crate::transport::TransportError;

/// Errors and warnings raised while negotiating.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("conflicting offer received while awaiting an answer")]
    ConflictingOffer,

    #[error("cannot {event} in state {state}")]
    InvalidTransition {
        state: NegotiationState,
        event: &'static str,
    },

    #[error("unexpected {kind} in state {state}")]
    UnexpectedSignal {
        state: NegotiationState,
        kind: &'static str,
    },

    #[error("remote description rejected: {0}")]
    RemoteDescriptionRejected(String),

    #[error("ICE candidate rejected: {0}")]
    CandidateRejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("negotiation timed out after {0:?}")]
    Timeout(Duration),

    #[error("relay failed: {0}")]
    RelayFailed(String),

    #[error("malformed signaling message: {0}")]
    MalformedSignal(String),
}
