use sendit_negotiation::{NegotiationError, NegotiationState};
use sendit_protocol::TransferMetadata;
use sendit_transfer::{Direction, ReceivedFile, TransferError, TransferProgress, TransferSession};

/// Everything a peer reports to its owner.
#[derive(Debug)]
pub enum PeerEvent {
    RelayOpened,
    RelayClosed,
    RelayErrored(String),

    NegotiationStateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },
    /// Something the remote side did was ignored.
    NegotiationWarning(NegotiationError),
    NegotiationFailed(NegotiationError),

    ChannelOpen,
    ChannelClosed,

    /// The remote side announced a file.
    IncomingFile(TransferMetadata),
    Progress(TransferProgress),
    FileSent(TransferSession),
    FileReceived(ReceivedFile),
    TransferFailed {
        direction: Direction,
        error: TransferError,
    },

    /// Free-form text from the remote peer.
    Message(String),

    /// A command could not be carried out in the current state.
    CommandRejected(String),

    /// The peer has shut down; no further events follow.
    Closed,
}
