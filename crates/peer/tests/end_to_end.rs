//! Two in-process peers wired back to back: the relay is a pair of queues and
//! the transport connects two memory channels once the answer lands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use sendit_negotiation::{
    NegotiationError, NegotiationState, PeerTransport, TransportError, TransportEvent,
    TransportFuture,
};
use sendit_peer::{
    CloseFuture, Peer, PeerConfig, PeerEvent, PeerHandle, SignalError, SignalFuture, SignalSink,
};
use sendit_protocol::{Frame, IceCandidate, SignalingMessage};
use sendit_relay_client::RelayEvent;
use sendit_transfer::{ChannelError, Direction, MemoryChannel, MemorySink, MemorySource, TransferError};

// ----------------------------------------------------------------------
// Loopback relay
// ----------------------------------------------------------------------

struct LoopbackSignal {
    remote_tx: mpsc::Sender<RelayEvent>,
    closed: AtomicBool,
}

impl SignalSink for LoopbackSignal {
    fn send_signal(&self, msg: SignalingMessage) -> SignalFuture<'_> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SignalError::Closed);
            }
            self.remote_tx
                .send(RelayEvent::Message(msg))
                .await
                .map_err(|_| SignalError::Closed)
        })
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
        })
    }
}

// ----------------------------------------------------------------------
// Loopback transport
// ----------------------------------------------------------------------

struct LoopbackTransport {
    name: &'static str,
    events_tx: mpsc::Sender<TransportEvent>,
    remote: OnceLock<Weak<LoopbackTransport>>,
    channel: Mutex<Option<Arc<MemoryChannel>>>,
    fail_after_binary: Option<usize>,
    remote_candidates: Mutex<Vec<IceCandidate>>,
    resets: Mutex<usize>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    fn new(
        name: &'static str,
        fail_after_binary: Option<usize>,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            name,
            events_tx,
            remote: OnceLock::new(),
            channel: Mutex::new(None),
            fail_after_binary,
            remote_candidates: Mutex::new(Vec::new()),
            resets: Mutex::new(0),
            closed: AtomicBool::new(false),
        });
        (transport, events_rx)
    }

    fn link(a: &Arc<Self>, b: &Arc<Self>) {
        a.remote.set(Arc::downgrade(b)).ok();
        b.remote.set(Arc::downgrade(a)).ok();
    }

    fn candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 1 127.0.0.1 9 typ host", self.name),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    fn new_channel(&self) -> (Arc<MemoryChannel>, mpsc::UnboundedReceiver<Frame>) {
        let (channel, rx) = MemoryChannel::new();
        if let Some(n) = self.fail_after_binary {
            channel.fail_after_binary(n);
        }
        (Arc::new(channel), rx)
    }

    /// Opens a channel pair; frames sent on one side arrive as transport
    /// events on the other.
    async fn connect(&self) -> Result<(), TransportError> {
        let remote = self
            .remote
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::new("no remote transport"))?;

        let (local_channel, local_rx) = self.new_channel();
        let (remote_channel, remote_rx) = remote.new_channel();
        forward(local_rx, remote.events_tx.clone());
        forward(remote_rx, self.events_tx.clone());
        *self.channel.lock().unwrap() = Some(local_channel);
        *remote.channel.lock().unwrap() = Some(remote_channel);

        let _ = self.events_tx.send(TransportEvent::ChannelOpen).await;
        let _ = remote.events_tx.send(TransportEvent::ChannelOpen).await;
        Ok(())
    }

    fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.lock().unwrap().clone()
    }
}

fn forward(mut rx: mpsc::UnboundedReceiver<Frame>, tx: mpsc::Sender<TransportEvent>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if tx.send(TransportEvent::ChannelMessage(frame)).await.is_err() {
                break;
            }
        }
    });
}

impl PeerTransport for LoopbackTransport {
    type Channel = Arc<MemoryChannel>;

    fn create_offer(&self) -> TransportFuture<'_, String> {
        Box::pin(async move {
            let _ = self
                .events_tx
                .send(TransportEvent::LocalCandidate(self.candidate()))
                .await;
            Ok(format!("offer-from-{}", self.name))
        })
    }

    fn accept_offer(&self, _sdp: String) -> TransportFuture<'_, String> {
        Box::pin(async move {
            let _ = self
                .events_tx
                .send(TransportEvent::LocalCandidate(self.candidate()))
                .await;
            Ok(format!("answer-from-{}", self.name))
        })
    }

    fn accept_answer(&self, _sdp: String) -> TransportFuture<'_, ()> {
        Box::pin(self.connect())
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.remote_candidates.lock().unwrap().push(candidate);
            Ok(())
        })
    }

    fn reset(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        })
    }

    fn channel(&self) -> Option<Self::Channel> {
        self.channel.lock().unwrap().clone()
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            if let Some(channel) = self.channel.lock().unwrap().take() {
                channel.close();
            }
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

struct Side {
    handle: PeerHandle,
    events: mpsc::Receiver<PeerEvent>,
    relay_tx: mpsc::Sender<RelayEvent>,
    transport: Arc<LoopbackTransport>,
    sink: Arc<MemorySink>,
    task: JoinHandle<()>,
}

impl Side {
    /// Waits for the first event matching `pred`, skipping the rest.
    async fn expect(&mut self, mut pred: impl FnMut(&PeerEvent) -> bool) -> PeerEvent {
        timeout(Duration::from_secs(300), async {
            loop {
                let event = self.events.recv().await.expect("event stream ended");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for peer event")
    }

    /// Collects everything up to and including [`PeerEvent::Closed`].
    async fn drain(&mut self) -> Vec<PeerEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.events.recv().await {
            let closed = matches!(event, PeerEvent::Closed);
            out.push(event);
            if closed {
                break;
            }
        }
        out
    }
}

struct Room {
    a: Side,
    b: Side,
}

fn room(b_fail_after_binary: Option<usize>) -> Room {
    let (a_relay_tx, a_relay_rx) = mpsc::channel(256);
    let (b_relay_tx, b_relay_rx) = mpsc::channel(256);
    let (a_transport, a_transport_rx) = LoopbackTransport::new("a", None);
    let (b_transport, b_transport_rx) = LoopbackTransport::new("b", b_fail_after_binary);
    LoopbackTransport::link(&a_transport, &b_transport);

    let a = side(
        "peer-a",
        a_transport,
        a_transport_rx,
        (a_relay_tx, a_relay_rx),
        b_relay_tx.clone(),
    );
    let b = side(
        "peer-b",
        b_transport,
        b_transport_rx,
        (b_relay_tx, b_relay_rx),
        a.relay_tx.clone(),
    );
    Room { a, b }
}

fn side(
    peer_id: &str,
    transport: Arc<LoopbackTransport>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    (relay_tx, relay_rx): (mpsc::Sender<RelayEvent>, mpsc::Receiver<RelayEvent>),
    remote_relay_tx: mpsc::Sender<RelayEvent>,
) -> Side {
    relay_tx.try_send(RelayEvent::Opened).unwrap();
    let sink = Arc::new(MemorySink::new());
    let signal = LoopbackSignal {
        remote_tx: remote_relay_tx,
        closed: AtomicBool::new(false),
    };
    let config = PeerConfig {
        peer_id: Some(peer_id.into()),
        ..PeerConfig::default()
    };
    let (peer, events) = Peer::new(config, transport.clone(), signal, sink.clone());
    assert_eq!(peer.peer_id(), peer_id);
    let (handle, task) = peer.spawn(relay_rx, transport_rx);
    Side {
        handle,
        events,
        relay_tx,
        transport,
        sink,
        task,
    }
}

fn is_connected(event: &PeerEvent) -> bool {
    matches!(
        event,
        PeerEvent::NegotiationStateChanged {
            to: NegotiationState::Connected,
            ..
        }
    )
}

fn is_channel_open(event: &PeerEvent) -> bool {
    matches!(event, PeerEvent::ChannelOpen)
}

async fn connected_room(b_fail_after_binary: Option<usize>) -> Room {
    let mut room = room(b_fail_after_binary);
    room.b.handle.await_offer().await.unwrap();
    room.a.handle.initiate().await.unwrap();
    room.a.expect(is_channel_open).await;
    room.b.expect(is_channel_open).await;
    room
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn handshake_connects_both_peers() {
    let mut room = room(None);
    room.b.handle.await_offer().await.unwrap();
    room.a.handle.initiate().await.unwrap();

    room.a.expect(|e| matches!(e, PeerEvent::RelayOpened)).await;
    room.a.expect(is_connected).await;
    room.a.expect(is_channel_open).await;
    room.b.expect(is_connected).await;
    room.b.expect(is_channel_open).await;

    // Relay traffic is handled ahead of commands, so once this message is
    // through, every trickled candidate has been applied.
    room.a.handle.send_text("sync").await.unwrap();
    room.b.expect(|e| matches!(e, PeerEvent::Message(_))).await;

    // Each side applied the other's candidate once a description existed.
    assert!(
        room.a.transport.remote_candidates()[0]
            .candidate
            .contains("candidate:b")
    );
    assert!(
        room.b.transport.remote_candidates()[0]
            .candidate
            .contains("candidate:a")
    );
}

#[tokio::test(start_paused = true)]
async fn file_of_50000_bytes_arrives_in_four_chunks() {
    let mut room = connected_room(None).await;
    let data = pattern(50_000);
    room.b
        .handle
        .send_file(MemorySource::new("photo.jpg", "image/jpeg", data.clone()))
        .await
        .unwrap();

    let announced = room.a.expect(|e| matches!(e, PeerEvent::IncomingFile(_))).await;
    let PeerEvent::IncomingFile(metadata) = announced else {
        unreachable!()
    };
    assert_eq!(metadata.size, 50_000);
    assert_eq!(metadata.total_chunks, 4);

    let mut received = Vec::new();
    let file = loop {
        match room.a.expect(|_| true).await {
            PeerEvent::Progress(p) => {
                assert_eq!(p.direction, Direction::Inbound);
                received.push(p.bytes_transferred);
            }
            PeerEvent::FileReceived(file) => break file,
            other => panic!("unexpected event {other:?}"),
        }
    };
    assert_eq!(received, vec![16_384, 32_768, 49_152, 50_000]);
    assert_eq!(file.name, "photo.jpg");
    assert_eq!(file.mime_type, "image/jpeg");
    assert_eq!(file.size, 50_000);

    let stored = room.a.sink.files().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data, data);

    let sent = room.b.expect(|e| matches!(e, PeerEvent::FileSent(_))).await;
    let PeerEvent::FileSent(session) = sent else {
        unreachable!()
    };
    assert_eq!(session.bytes_transferred, 50_000);
    assert_eq!(session.chunks_transferred, 4);
}

#[tokio::test(start_paused = true)]
async fn sender_abort_leaves_receiver_incomplete() {
    let mut room = connected_room(Some(2)).await;
    let size = 3 * 16_384 + 100;
    room.b
        .handle
        .send_file(MemorySource::new("big.bin", "application/octet-stream", pattern(size)))
        .await
        .unwrap();

    let failed = room
        .b
        .expect(|e| matches!(e, PeerEvent::TransferFailed { .. }))
        .await;
    assert!(matches!(
        failed,
        PeerEvent::TransferFailed {
            direction: Direction::Outbound,
            error: TransferError::Channel(ChannelError::Closed),
        }
    ));

    let failed = room
        .a
        .expect(|e| matches!(e, PeerEvent::TransferFailed { .. }))
        .await;
    match failed {
        PeerEvent::TransferFailed {
            direction: Direction::Inbound,
            error: TransferError::IncompleteTransfer { expected, received },
        } => {
            assert_eq!(expected, size as u64);
            assert_eq!(received, 2 * 16_384);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(room.a.sink.files().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn text_messages_reach_the_other_peer() {
    let mut room = connected_room(None).await;
    room.a.handle.send_text("Hello from peer!").await.unwrap();

    let event = room.b.expect(|e| matches!(e, PeerEvent::Message(_))).await;
    assert!(matches!(event, PeerEvent::Message(ref t) if t == "Hello from peer!"));
}

#[tokio::test(start_paused = true)]
async fn send_before_channel_open_is_rejected() {
    let mut room = room(None);
    room.b
        .handle
        .send_file(MemorySource::new("a.txt", "text/plain", vec![1, 2, 3]))
        .await
        .unwrap();

    let event = room
        .b
        .expect(|e| matches!(e, PeerEvent::TransferFailed { .. }))
        .await;
    assert!(matches!(
        event,
        PeerEvent::TransferFailed {
            direction: Direction::Outbound,
            error: TransferError::ChannelNotReady,
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn simultaneous_initiate_settles_on_one_connection() {
    let mut room = room(None);
    room.a.handle.initiate().await.unwrap();
    room.b.handle.initiate().await.unwrap();

    // Whichever offer lands first, at most the lower id backs off.
    room.a.expect(is_channel_open).await;
    room.b.expect(is_channel_open).await;
    assert_eq!(*room.b.transport.resets.lock().unwrap(), 0);
    assert!(*room.a.transport.resets.lock().unwrap() <= 1);

    room.a.handle.send_text("ping").await.unwrap();
    room.b.expect(|e| matches!(e, PeerEvent::Message(_))).await;
}

#[tokio::test(start_paused = true)]
async fn missing_answer_times_out() {
    // Nobody reads the remote end of this relay.
    let (silent_tx, _silent_rx) = mpsc::channel(256);
    let (transport, transport_rx) = LoopbackTransport::new("a", None);
    let mut a = side("peer-a", transport, transport_rx, mpsc::channel(256), silent_tx);
    a.handle.initiate().await.unwrap();

    let event = a
        .expect(|e| matches!(e, PeerEvent::NegotiationFailed(_)))
        .await;
    assert!(matches!(
        event,
        PeerEvent::NegotiationFailed(NegotiationError::Timeout(_))
    ));
    assert!(matches!(a.drain().await.last(), Some(PeerEvent::Closed)));
    a.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn relay_close_closes_the_peer() {
    let mut room = room(None);
    room.a.relay_tx.send(RelayEvent::Closed).await.unwrap();

    let events = room.a.drain().await;
    assert!(events.iter().any(|e| matches!(e, PeerEvent::RelayClosed)));
    assert!(events.iter().any(|e| matches!(
        e,
        PeerEvent::NegotiationStateChanged {
            to: NegotiationState::Closed,
            ..
        }
    )));
    assert!(matches!(events.last(), Some(PeerEvent::Closed)));
    room.a.task.await.unwrap();
    assert!(room.a.handle.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn malformed_signal_fails_negotiation() {
    let mut room = room(None);
    room.b.handle.await_offer().await.unwrap();
    room.b
        .relay_tx
        .send(RelayEvent::Malformed("unknown message type".into()))
        .await
        .unwrap();

    let events = room.b.drain().await;
    assert!(events.iter().any(|e| matches!(
        e,
        PeerEvent::NegotiationFailed(NegotiationError::MalformedSignal(_))
    )));
    assert!(matches!(events.last(), Some(PeerEvent::Closed)));
}

#[tokio::test(start_paused = true)]
async fn close_tears_down_transport() {
    let mut room = connected_room(None).await;
    room.a.handle.close().await.unwrap();

    assert!(matches!(room.a.drain().await.last(), Some(PeerEvent::Closed)));
    room.a.task.await.unwrap();
    assert!(room.a.transport.closed.load(Ordering::SeqCst));
    assert!(room.a.handle.close().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn initiate_twice_is_rejected() {
    let mut room = room(None);
    room.a.handle.initiate().await.unwrap();
    room.a.handle.initiate().await.unwrap();

    room.a
        .expect(|e| matches!(e, PeerEvent::CommandRejected(_)))
        .await;
}
