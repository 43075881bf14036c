use std::fmt;

/// Negotiation state of one peer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Joined the room, nothing exchanged yet.
    Idle,
    /// Declared answerer, waiting for the remote offer.
    AwaitingOffer,
    /// Local offer sent, waiting for the remote answer.
    AwaitingAnswer,
    /// Remote offer applied, local answer not yet forwarded.
    AwaitingLocalAnswer,
    Connected,
    Failed,
    Closed,
}

impl NegotiationState {
    /// `true` for states a session never leaves (except `Failed -> Closed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// `true` for the states bounded by the negotiation timeout.
    pub fn is_timed(self) -> bool {
        matches!(self, Self::AwaitingAnswer | Self::AwaitingLocalAnswer)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingOffer => "awaiting-offer",
            Self::AwaitingAnswer => "awaiting-answer",
            Self::AwaitingLocalAnswer => "awaiting-local-answer",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
