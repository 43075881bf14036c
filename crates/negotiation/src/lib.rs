//! Offer/answer negotiation between the two peers of a room.
//!
//! [`NegotiationSession`] is an explicit state machine: every input (local
//! command, remote signal, transport report, timer tick) goes through
//! [`NegotiationSession::handle`], which returns the outcomes the caller must
//! act on. Signals in the outcomes are meant for the relay; the session never
//! talks to the relay itself.
//!
//! The peer connection machinery sits behind [`PeerTransport`].

mod error;
mod session;
mod state;
mod transport;

pub use error::NegotiationError;
pub use session::{NegotiationEvent, NegotiationOutcome, NegotiationSession};
pub use state::NegotiationState;
pub use transport::{PeerTransport, TransportError, TransportEvent, TransportFuture};
