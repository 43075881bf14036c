//! The per-peer event loop.
//!
//! Relay events, transport events, commands, sender reports and the two
//! timers all feed one `select!`. Each handler runs to completion before the
//! next input is taken, so the negotiation session and the receiver never
//! see interleaved events. Only the chunk sender runs on its own task.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use sendit_negotiation::{
    NegotiationEvent, NegotiationOutcome, NegotiationSession, NegotiationState, PeerTransport,
    TransportEvent,
};
use sendit_protocol::{NegotiationConfig, SignalingMessage, TransferConfig};
use sendit_relay_client::RelayEvent;
use sendit_transfer::{
    ChunkReceiver, ChunkSender, DataChannel, Direction, FileSink, FileSource, ReceiveOutcome,
    SessionRegistry, SharedRegistry, TransferError, TransferProgress, TransferSession,
};

use crate::handle::{PeerCommand, PeerHandle};
use crate::{COMMAND_BUFFER_SIZE, EVENT_BUFFER_SIZE, PeerEvent, SignalSink};

const PROGRESS_BUFFER_SIZE: usize = 64;

/// Tunables for one peer.
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    pub negotiation: NegotiationConfig,
    pub transfer: TransferConfig,
    /// Id carried in local offers; random when unset.
    pub peer_id: Option<String>,
}

/// Where the spawned sender reports back to the loop.
struct SenderReports {
    progress_tx: mpsc::Sender<TransferProgress>,
    done_tx: mpsc::Sender<Result<TransferSession, TransferError>>,
}

/// One side of a room: negotiation plus both transfer directions.
pub struct Peer<T: PeerTransport, S, K> {
    session: NegotiationSession<T>,
    signal: S,
    receiver: ChunkReceiver<K>,
    registry: SharedRegistry,
    transfer_config: TransferConfig,
    events_tx: mpsc::Sender<PeerEvent>,
    channel: Option<T::Channel>,
    /// Cancels the running outbound transfer, if any.
    outbound: Option<CancellationToken>,
}

impl<T, S, K> Peer<T, S, K>
where
    T: PeerTransport,
    T::Channel: DataChannel,
    S: SignalSink,
    K: FileSink + 'static,
{
    /// Builds a peer around `transport`, talking to the room through
    /// `signal` and saving inbound files to `sink`.
    ///
    /// Returns the peer and its event stream.
    pub fn new(
        config: PeerConfig,
        transport: Arc<T>,
        signal: S,
        sink: K,
    ) -> (Self, mpsc::Receiver<PeerEvent>) {
        let session = match config.peer_id {
            Some(id) => NegotiationSession::with_peer_id(transport, config.negotiation, id),
            None => NegotiationSession::new(transport, config.negotiation),
        };
        let registry = SessionRegistry::shared();
        let receiver = ChunkReceiver::new(config.transfer.clone(), registry.clone(), sink);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);

        let peer = Self {
            session,
            signal,
            receiver,
            registry,
            transfer_config: config.transfer,
            events_tx,
            channel: None,
            outbound: None,
        };
        (peer, events_rx)
    }

    pub fn peer_id(&self) -> &str {
        self.session.peer_id()
    }

    /// Starts the event loop on its own task.
    ///
    /// `relay_rx` is the room's event stream and `transport_rx` the stream
    /// the transport was built with.
    pub fn spawn(
        self,
        relay_rx: mpsc::Receiver<RelayEvent>,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> (PeerHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let task = tokio::spawn(self.run(relay_rx, transport_rx, commands_rx));
        (PeerHandle::new(commands_tx), task)
    }

    async fn run(
        mut self,
        mut relay_rx: mpsc::Receiver<RelayEvent>,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut commands_rx: mpsc::Receiver<PeerCommand>,
    ) {
        let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let reports = SenderReports {
            progress_tx,
            done_tx,
        };

        let mut relay_open = true;
        let mut transport_open = true;
        let mut commands_open = true;

        info!(peer_id = %self.session.peer_id(), "peer started");

        loop {
            let negotiation_deadline = self.session.deadline();
            let receive_deadline = self.receiver.deadline();

            tokio::select! {
                biased;

                event = relay_rx.recv(), if relay_open => {
                    let event = event.unwrap_or(RelayEvent::Closed);
                    if event.is_terminal() {
                        relay_open = false;
                    }
                    self.on_relay_event(event).await;
                }

                event = transport_rx.recv(), if transport_open => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => {
                        debug!("transport event stream ended");
                        transport_open = false;
                    }
                },

                Some(progress) = progress_rx.recv() => {
                    self.emit(PeerEvent::Progress(progress)).await;
                }

                Some(result) = done_rx.recv() => self.on_send_finished(result).await,

                cmd = commands_rx.recv(), if commands_open => match cmd {
                    Some(cmd) => self.on_command(cmd, &reports).await,
                    None => {
                        debug!("all peer handles dropped");
                        commands_open = false;
                    }
                },

                () = sleep_until(negotiation_deadline) => {
                    self.negotiate(NegotiationEvent::Tick(Instant::now())).await;
                }

                () = sleep_until(receive_deadline) => {
                    if let Some(outcome) = self.receiver.check_timeout(Instant::now()).await {
                        self.on_receive_outcome(outcome).await;
                    }
                }
            }

            if self.session.state().is_terminal() {
                break;
            }
        }

        self.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    async fn on_command(&mut self, cmd: PeerCommand, reports: &SenderReports) {
        match cmd {
            PeerCommand::Initiate => self.negotiate(NegotiationEvent::Initiate).await,
            PeerCommand::AwaitOffer => self.negotiate(NegotiationEvent::AwaitOffer).await,
            PeerCommand::SendFile(source) => self.start_send(source, reports).await,
            PeerCommand::SendText(text) => self.send_text(text).await,
            PeerCommand::Close => {
                info!("close requested");
                self.negotiate(NegotiationEvent::Close).await;
            }
        }
    }

    async fn on_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Opened => self.emit(PeerEvent::RelayOpened).await,
            RelayEvent::Message(msg) => self.negotiate(NegotiationEvent::Remote(msg)).await,
            RelayEvent::Malformed(reason) => {
                self.negotiate(NegotiationEvent::MalformedSignal(reason)).await;
            }
            RelayEvent::Closed => {
                self.emit(PeerEvent::RelayClosed).await;
                self.negotiate(NegotiationEvent::RelayClosed).await;
            }
            RelayEvent::Errored(reason) => {
                self.emit(PeerEvent::RelayErrored(reason.clone())).await;
                self.negotiate(NegotiationEvent::RelayErrored(reason)).await;
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.negotiate(NegotiationEvent::LocalCandidate(candidate))
                    .await;
            }
            TransportEvent::ConnectionFailed(reason) => {
                self.negotiate(NegotiationEvent::TransportFailed(reason))
                    .await;
            }
            TransportEvent::ChannelOpen => {
                let channel = self
                    .session
                    .channel()
                    .or_else(|| self.session.transport().channel());
                match channel {
                    Some(channel) => {
                        info!(state = %self.session.state(), "data channel open");
                        self.channel = Some(channel);
                        self.emit(PeerEvent::ChannelOpen).await;
                    }
                    None => warn!("channel-open reported without a channel"),
                }
            }
            TransportEvent::ChannelMessage(frame) => {
                let outcome = self.receiver.on_frame(frame).await;
                self.on_receive_outcome(outcome).await;
            }
            TransportEvent::ChannelClosed => {
                info!("data channel closed");
                self.channel = None;
                if let Some(cancel) = &self.outbound {
                    cancel.cancel();
                }
                if let Some(outcome) = self.receiver.on_channel_closed().await {
                    self.on_receive_outcome(outcome).await;
                }
                self.emit(PeerEvent::ChannelClosed).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    /// Feeds `event` to the session and acts on the outcomes.
    ///
    /// Relay sends can produce follow-up events (answer sent, relay failed);
    /// those are queued and applied before returning.
    async fn negotiate(&mut self, event: NegotiationEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let outcomes = match self.session.handle(event).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!("negotiation command rejected: {e}");
                    self.emit(PeerEvent::CommandRejected(e.to_string())).await;
                    continue;
                }
            };

            for outcome in outcomes {
                match outcome {
                    NegotiationOutcome::Signal(msg) => {
                        let is_answer = matches!(msg, SignalingMessage::Answer { .. });
                        match self.signal.send_signal(msg).await {
                            Ok(()) if is_answer => {
                                pending.push_back(NegotiationEvent::LocalAnswerSent);
                            }
                            Ok(()) => {}
                            Err(e) => {
                                warn!("relay send failed: {e}");
                                pending.push_back(NegotiationEvent::RelayErrored(e.to_string()));
                            }
                        }
                    }
                    NegotiationOutcome::StateChanged { from, to } => {
                        if to == NegotiationState::Connected {
                            info!("negotiation complete");
                        }
                        self.emit(PeerEvent::NegotiationStateChanged { from, to })
                            .await;
                    }
                    NegotiationOutcome::Warning(e) => {
                        self.emit(PeerEvent::NegotiationWarning(e)).await;
                    }
                    NegotiationOutcome::Failed(e) => {
                        warn!("negotiation failed: {e}");
                        self.emit(PeerEvent::NegotiationFailed(e)).await;
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Transfer
    // ------------------------------------------------------------------

    async fn start_send(&mut self, source: Box<dyn FileSource>, reports: &SenderReports) {
        let Some(channel) = self.channel.clone() else {
            self.transfer_failed(Direction::Outbound, TransferError::ChannelNotReady)
                .await;
            return;
        };
        if self.outbound.is_some() {
            self.transfer_failed(
                Direction::Outbound,
                TransferError::SessionActive(Direction::Outbound),
            )
            .await;
            return;
        }

        let cancel = CancellationToken::new();
        let sender = ChunkSender::new(self.transfer_config.clone(), self.registry.clone())
            .with_progress(reports.progress_tx.clone())
            .with_cancel(cancel.clone());
        let done_tx = reports.done_tx.clone();
        self.outbound = Some(cancel);

        tokio::spawn(async move {
            let result = sender.send(&channel, &*source).await;
            let _ = done_tx.send(result).await;
        });
    }

    async fn on_send_finished(&mut self, result: Result<TransferSession, TransferError>) {
        self.outbound = None;
        match result {
            Ok(session) => self.emit(PeerEvent::FileSent(session)).await,
            Err(error) => self.transfer_failed(Direction::Outbound, error).await,
        }
    }

    async fn send_text(&mut self, text: String) {
        let Some(channel) = &self.channel else {
            self.emit(PeerEvent::CommandRejected("channel is not open".into()))
                .await;
            return;
        };
        if let Err(e) = channel.send_text(text).await {
            warn!("text send failed: {e}");
            self.emit(PeerEvent::CommandRejected(format!("send text: {e}")))
                .await;
        }
    }

    async fn on_receive_outcome(&mut self, outcome: ReceiveOutcome) {
        let event = match outcome {
            ReceiveOutcome::Ignored => return,
            ReceiveOutcome::Announced(metadata) => PeerEvent::IncomingFile(metadata),
            ReceiveOutcome::Progress(progress) => PeerEvent::Progress(progress),
            ReceiveOutcome::Completed(file) => PeerEvent::FileReceived(file),
            ReceiveOutcome::Failed(error) => PeerEvent::TransferFailed {
                direction: Direction::Inbound,
                error,
            },
            ReceiveOutcome::Message(text) => PeerEvent::Message(text),
        };
        self.emit(event).await;
    }

    async fn transfer_failed(&mut self, direction: Direction, error: TransferError) {
        warn!(%direction, "transfer failed: {error}");
        self.emit(PeerEvent::TransferFailed { direction, error }).await;
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    async fn shutdown(&mut self) {
        if let Some(cancel) = self.outbound.take() {
            cancel.cancel();
            self.transfer_failed(Direction::Outbound, TransferError::Cancelled)
                .await;
        }
        self.channel = None;
        if let Some(outcome) = self.receiver.on_channel_closed().await {
            self.on_receive_outcome(outcome).await;
        }
        self.registry.lock().await.clear();
        self.signal.close().await;

        info!(state = %self.session.state(), "peer stopped");
        self.emit(PeerEvent::Closed).await;
    }

    async fn emit(&self, event: PeerEvent) {
        if self.events_tx.send(event).await.is_err() {
            trace!("peer event receiver dropped");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
