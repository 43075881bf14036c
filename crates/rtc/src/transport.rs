//! `PeerTransport` over a `webrtc` peer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use sendit_negotiation::{PeerTransport, TransportEvent, TransportFuture};
use sendit_protocol::constants::DATA_CHANNEL_LABEL;
use sendit_protocol::{Frame, IceCandidate};

use crate::channel::RtcChannel;
use crate::convert::{from_rtc, to_rtc};
use crate::{DEFAULT_STUN_SERVER, RtcError};

/// Peer connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcConfig {
    /// STUN/TURN URLs. Empty means host candidates only.
    pub ice_servers: Vec<String>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// State shared with the `webrtc` callbacks.
struct Shared {
    events_tx: mpsc::Sender<TransportEvent>,
    channel: Mutex<Option<RtcChannel>>,
    /// Bumped on every reset; callbacks of older connections go quiet.
    generation: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_channel(&self, channel: Option<RtcChannel>) {
        *self.channel.lock().unwrap_or_else(PoisonError::into_inner) = channel;
    }

    fn channel(&self) -> Option<RtcChannel> {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn emit(&self, generation: u64, event: TransportEvent) {
        if !self.is_current(generation) {
            debug!("dropping event from a discarded peer connection");
            return;
        }
        let _ = self.events_tx.send(event).await;
    }
}

/// One WebRTC peer connection carrying the `file` data channel.
///
/// The offerer creates the channel; the answerer adopts the one the remote
/// announces.
pub struct RtcTransport {
    config: RtcConfig,
    pc: RwLock<Arc<RTCPeerConnection>>,
    shared: Arc<Shared>,
}

impl RtcTransport {
    /// Creates the transport; its events go to `events_tx`.
    pub async fn new(
        config: RtcConfig,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, RtcError> {
        let shared = Arc::new(Shared {
            events_tx,
            channel: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        let pc = new_peer_connection(&config, &shared, 0).await?;
        Ok(Self {
            config,
            pc: RwLock::new(pc),
            shared,
        })
    }

    async fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        self.pc.read().await.clone()
    }

    async fn create_offer_inner(&self) -> Result<String, RtcError> {
        let pc = self.peer_connection().await;
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let dc = pc
            .create_data_channel(
                DATA_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        wire_channel(dc, self.shared.clone(), generation);

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or(RtcError::MissingLocalDescription)?;
        Ok(local.sdp)
    }

    async fn accept_offer_inner(&self, sdp: String) -> Result<String, RtcError> {
        let pc = self.peer_connection().await;
        pc.set_remote_description(RTCSessionDescription::offer(sdp)?)
            .await?;
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or(RtcError::MissingLocalDescription)?;
        Ok(local.sdp)
    }

    async fn accept_answer_inner(&self, sdp: String) -> Result<(), RtcError> {
        let pc = self.peer_connection().await;
        pc.set_remote_description(RTCSessionDescription::answer(sdp)?)
            .await?;
        Ok(())
    }

    async fn reset_inner(&self) -> Result<(), RtcError> {
        let mut pc = self.pc.write().await;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_channel(None);
        if let Err(e) = pc.close().await {
            debug!("closing discarded peer connection: {e}");
        }
        *pc = new_peer_connection(&self.config, &self.shared, generation).await?;
        info!(generation, "peer connection reset");
        Ok(())
    }

    async fn close_inner(&self) -> Result<(), RtcError> {
        // Silence callbacks fired by our own close.
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(channel) = self.shared.channel() {
            channel.close().await;
        }
        self.shared.set_channel(None);
        self.peer_connection().await.close().await?;
        Ok(())
    }
}

impl PeerTransport for RtcTransport {
    type Channel = RtcChannel;

    fn create_offer(&self) -> TransportFuture<'_, String> {
        Box::pin(async move { Ok(self.create_offer_inner().await?) })
    }

    fn accept_offer(&self, sdp: String) -> TransportFuture<'_, String> {
        Box::pin(async move { Ok(self.accept_offer_inner(sdp).await?) })
    }

    fn accept_answer(&self, sdp: String) -> TransportFuture<'_, ()> {
        Box::pin(async move { Ok(self.accept_answer_inner(sdp).await?) })
    }

    fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let pc = self.peer_connection().await;
            pc.add_ice_candidate(to_rtc(candidate))
                .await
                .map_err(RtcError::from)?;
            Ok(())
        })
    }

    fn reset(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move { Ok(self.reset_inner().await?) })
    }

    fn channel(&self) -> Option<Self::Channel> {
        self.shared.channel()
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move { Ok(self.close_inner().await?) })
    }
}

/// Builds a peer connection and wires its callbacks to `shared`.
async fn new_peer_connection(
    config: &RtcConfig,
    shared: &Arc<Shared>,
    generation: u64,
) -> Result<Arc<RTCPeerConnection>, RtcError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let ice_servers = if config.ice_servers.is_empty() {
        Vec::new()
    } else {
        vec![RTCIceServer {
            urls: config.ice_servers.clone(),
            ..Default::default()
        }]
    };
    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration {
            ice_servers,
            ..Default::default()
        })
        .await?,
    );

    let ice_shared = shared.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let shared = ice_shared.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    shared
                        .emit(generation, TransportEvent::LocalCandidate(from_rtc(init)))
                        .await
                }
                Err(e) => warn!("cannot serialize local candidate: {e}"),
            }
        })
    }));

    let state_shared = shared.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let shared = state_shared.clone();
        Box::pin(async move {
            debug!(?state, "peer connection state");
            if state == RTCPeerConnectionState::Failed {
                shared
                    .emit(
                        generation,
                        TransportEvent::ConnectionFailed("peer connection failed".into()),
                    )
                    .await;
            }
        })
    }));

    let dc_shared = shared.clone();
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let shared = dc_shared.clone();
        Box::pin(async move {
            if dc.label() != DATA_CHANNEL_LABEL {
                warn!(label = dc.label(), "ignoring unexpected data channel");
                return;
            }
            debug!("remote announced the data channel");
            wire_channel(dc, shared, generation);
        })
    }));

    Ok(pc)
}

/// Forwards open/message/close of `dc` as transport events.
fn wire_channel(dc: Arc<RTCDataChannel>, shared: Arc<Shared>, generation: u64) {
    let open_shared = shared.clone();
    let open_dc = dc.clone();
    dc.on_open(Box::new(move || {
        let shared = open_shared.clone();
        let dc = open_dc.clone();
        Box::pin(async move {
            if !shared.is_current(generation) {
                return;
            }
            info!(label = dc.label(), "data channel open");
            shared.set_channel(Some(RtcChannel::new(dc)));
            shared.emit(generation, TransportEvent::ChannelOpen).await;
        })
    }));

    let msg_shared = shared.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let shared = msg_shared.clone();
        Box::pin(async move {
            let frame = if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => Frame::Text(text),
                    Err(_) => {
                        warn!("dropping non-UTF-8 text frame");
                        return;
                    }
                }
            } else {
                Frame::Binary(msg.data.to_vec())
            };
            shared
                .emit(generation, TransportEvent::ChannelMessage(frame))
                .await;
        })
    }));

    let close_shared = shared;
    dc.on_close(Box::new(move || {
        let shared = close_shared.clone();
        Box::pin(async move {
            if !shared.is_current(generation) {
                return;
            }
            info!("data channel closed");
            shared.set_channel(None);
            shared.emit(generation, TransportEvent::ChannelClosed).await;
        })
    }));
}
