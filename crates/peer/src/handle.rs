use tokio::sync::mpsc;

use sendit_transfer::FileSource;

use crate::PeerError;

pub(crate) enum PeerCommand {
    Initiate,
    AwaitOffer,
    SendFile(Box<dyn FileSource>),
    SendText(String),
    Close,
}

/// Cloneable control surface of a running [`Peer`](crate::Peer).
///
/// Every method only queues a command; results arrive as
/// [`PeerEvent`](crate::PeerEvent)s.
#[derive(Clone)]
pub struct PeerHandle {
    commands_tx: mpsc::Sender<PeerCommand>,
}

impl PeerHandle {
    pub(crate) fn new(commands_tx: mpsc::Sender<PeerCommand>) -> Self {
        Self { commands_tx }
    }

    /// Become the offerer.
    pub async fn initiate(&self) -> Result<(), PeerError> {
        self.command(PeerCommand::Initiate).await
    }

    /// Become the answerer and wait for the remote offer.
    pub async fn await_offer(&self) -> Result<(), PeerError> {
        self.command(PeerCommand::AwaitOffer).await
    }

    /// Streams `source` to the remote peer once the channel is open.
    pub async fn send_file(&self, source: impl FileSource + 'static) -> Result<(), PeerError> {
        self.command(PeerCommand::SendFile(Box::new(source))).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), PeerError> {
        self.command(PeerCommand::SendText(text.into())).await
    }

    /// Tears the peer down. The event stream ends with
    /// [`PeerEvent::Closed`](crate::PeerEvent::Closed).
    pub async fn close(&self) -> Result<(), PeerError> {
        self.command(PeerCommand::Close).await
    }

    /// `true` once the peer task has exited.
    pub fn is_stopped(&self) -> bool {
        self.commands_tx.is_closed()
    }

    async fn command(&self, cmd: PeerCommand) -> Result<(), PeerError> {
        self.commands_tx
            .send(cmd)
            .await
            .map_err(|_| PeerError::Stopped)
    }
}
