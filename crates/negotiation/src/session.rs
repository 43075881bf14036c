//! The negotiation state machine.
//!
//! ```text
//! Idle --initiate--> AwaitingAnswer                        [Offer]
//! Idle|AwaitingOffer --remote Offer--> AwaitingLocalAnswer [Answer]
//! AwaitingAnswer --remote Answer--> Connected
//! AwaitingLocalAnswer --local answer sent--> Connected
//! relay error | malformed signal | transport failure | timeout --> Failed
//! relay closed | close --> Closed
//! ```

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use sendit_protocol::{IceCandidate, NegotiationConfig, SignalingMessage};

use crate::error::NegotiationError;
use crate::state::NegotiationState;
use crate::transport::{PeerTransport, TransportError};

/// Input to [`NegotiationSession::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    /// Become the offerer.
    Initiate,
    /// Become the answerer and wait for the remote offer.
    AwaitOffer,
    /// A signaling message from the remote peer.
    Remote(SignalingMessage),
    /// A candidate gathered by the local transport.
    LocalCandidate(IceCandidate),
    /// The answer produced on `AwaitingLocalAnswer` was handed to the relay.
    LocalAnswerSent,
    RelayClosed,
    RelayErrored(String),
    /// The relay delivered something that is not a signaling message.
    MalformedSignal(String),
    /// The transport reported a connection failure.
    TransportFailed(String),
    /// Explicit local close.
    Close,
    /// Timer tick, checked against the negotiation deadline.
    Tick(Instant),
}

/// What the caller must act on after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Forward to the remote peer through the relay, in order.
    Signal(SignalingMessage),
    StateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },
    /// Something was ignored; the session carries on.
    Warning(NegotiationError),
    /// The session is now `Failed` and must be discarded.
    Failed(NegotiationError),
}

/// Negotiation state for one peer pair.
///
/// Owns the transport for its whole life. Not re-entrant: events are handled
/// one at a time, in arrival order.
pub struct NegotiationSession<T: PeerTransport> {
    state: NegotiationState,
    transport: Arc<T>,
    config: NegotiationConfig,
    local_peer_id: String,
    /// Remote candidates received before a remote description existed.
    pending_candidates: Vec<IceCandidate>,
    remote_description_set: bool,
    deadline: Option<Instant>,
}

impl<T: PeerTransport> NegotiationSession<T> {
    /// Creates an idle session with a random peer id.
    pub fn new(transport: Arc<T>, config: NegotiationConfig) -> Self {
        Self::with_peer_id(transport, config, uuid::Uuid::new_v4().to_string())
    }

    /// Creates an idle session with a fixed peer id.
    pub fn with_peer_id(
        transport: Arc<T>,
        config: NegotiationConfig,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            state: NegotiationState::Idle,
            transport,
            config,
            local_peer_id: peer_id.into(),
            pending_candidates: Vec::new(),
            remote_description_set: false,
            deadline: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Id carried in local offers for collision resolution.
    pub fn peer_id(&self) -> &str {
        &self.local_peer_id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// When the current exchange times out, if one is in flight.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Number of remote candidates waiting for a remote description.
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// The channel, only once `Connected` and the transport has it open.
    pub fn channel(&self) -> Option<T::Channel> {
        if self.state == NegotiationState::Connected {
            self.transport.channel()
        } else {
            None
        }
    }

    /// Applies one event.
    ///
    /// Returns `Err` only for local commands issued in a state that cannot
    /// take them; everything the remote side or the transport does is
    /// reported through the outcomes.
    pub async fn handle(
        &mut self,
        event: NegotiationEvent,
    ) -> Result<Vec<NegotiationOutcome>, NegotiationError> {
        let mut out = Vec::new();
        match event {
            NegotiationEvent::Initiate => self.initiate(&mut out).await?,
            NegotiationEvent::AwaitOffer => {
                self.require(NegotiationState::Idle, "await an offer")?;
                self.transition(NegotiationState::AwaitingOffer, &mut out);
            }
            NegotiationEvent::Remote(msg) => self.on_remote(msg, &mut out).await,
            NegotiationEvent::LocalCandidate(candidate) => {
                self.on_local_candidate(candidate, &mut out)
            }
            NegotiationEvent::LocalAnswerSent => {
                self.require(NegotiationState::AwaitingLocalAnswer, "confirm the answer")?;
                self.deadline = None;
                self.transition(NegotiationState::Connected, &mut out);
            }
            NegotiationEvent::RelayClosed | NegotiationEvent::Close => self.close(&mut out).await,
            NegotiationEvent::RelayErrored(reason) => {
                self.fail(NegotiationError::RelayFailed(reason), &mut out)
                    .await
            }
            NegotiationEvent::MalformedSignal(reason) => {
                self.fail(NegotiationError::MalformedSignal(reason), &mut out)
                    .await
            }
            NegotiationEvent::TransportFailed(reason) => {
                self.fail(TransportError(reason).into(), &mut out).await
            }
            NegotiationEvent::Tick(now) => self.on_tick(now, &mut out).await,
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Local side
    // -----------------------------------------------------------------------

    async fn initiate(&mut self, out: &mut Vec<NegotiationOutcome>) -> Result<(), NegotiationError> {
        self.require(NegotiationState::Idle, "initiate")?;
        match self.transport.create_offer().await {
            Ok(sdp) => {
                self.transition(NegotiationState::AwaitingAnswer, out);
                self.arm_deadline();
                out.push(NegotiationOutcome::Signal(SignalingMessage::Offer {
                    sdp,
                    peer_id: Some(self.local_peer_id.clone()),
                }));
            }
            Err(e) => self.fail(e.into(), out).await,
        }
        Ok(())
    }

    fn on_local_candidate(&mut self, candidate: IceCandidate, out: &mut Vec<NegotiationOutcome>) {
        if self.state.is_terminal() {
            debug!(state = %self.state, "dropping local candidate on finished session");
            return;
        }
        out.push(NegotiationOutcome::Signal(SignalingMessage::IceCandidate {
            candidate,
        }));
    }

    // -----------------------------------------------------------------------
    // Remote side
    // -----------------------------------------------------------------------

    async fn on_remote(&mut self, msg: SignalingMessage, out: &mut Vec<NegotiationOutcome>) {
        if self.state.is_terminal() {
            debug!(kind = msg.kind(), state = %self.state, "ignoring signal on finished session");
            return;
        }
        match msg {
            SignalingMessage::Offer { sdp, peer_id } => {
                self.on_remote_offer(sdp, peer_id, out).await
            }
            SignalingMessage::Answer { sdp } => self.on_remote_answer(sdp, out).await,
            SignalingMessage::IceCandidate { candidate } => {
                self.on_remote_candidate(candidate, out).await
            }
        }
    }

    async fn on_remote_offer(
        &mut self,
        sdp: String,
        remote_peer_id: Option<String>,
        out: &mut Vec<NegotiationOutcome>,
    ) {
        match self.state {
            NegotiationState::Idle | NegotiationState::AwaitingOffer => self.answer(sdp, out).await,
            NegotiationState::AwaitingAnswer => {
                warn!(
                    local = %self.local_peer_id,
                    remote = remote_peer_id.as_deref().unwrap_or("-"),
                    "offer collision"
                );
                out.push(NegotiationOutcome::Warning(NegotiationError::ConflictingOffer));

                if self.remote_wins(remote_peer_id.as_deref()) {
                    info!("offer collision lost, answering the remote offer");
                    if let Err(e) = self.transport.reset().await {
                        self.fail(e.into(), out).await;
                        return;
                    }
                    self.answer(sdp, out).await;
                } else {
                    info!("offer collision won, ignoring the remote offer");
                    // Candidates so far belong to the discarded remote offer.
                    self.pending_candidates.clear();
                }
            }
            state => {
                warn!(%state, "ignoring unexpected offer");
                out.push(NegotiationOutcome::Warning(NegotiationError::UnexpectedSignal {
                    state,
                    kind: "offer",
                }));
            }
        }
    }

    async fn answer(&mut self, sdp: String, out: &mut Vec<NegotiationOutcome>) {
        match self.transport.accept_offer(sdp).await {
            Ok(answer) => {
                self.remote_description_set = true;
                self.transition(NegotiationState::AwaitingLocalAnswer, out);
                self.arm_deadline();
                self.flush_pending(out).await;
                if self.state == NegotiationState::AwaitingLocalAnswer {
                    out.push(NegotiationOutcome::Signal(SignalingMessage::Answer {
                        sdp: answer,
                    }));
                }
            }
            Err(e) => {
                self.fail(NegotiationError::RemoteDescriptionRejected(e.0), out)
                    .await
            }
        }
    }

    async fn on_remote_answer(&mut self, sdp: String, out: &mut Vec<NegotiationOutcome>) {
        if self.state != NegotiationState::AwaitingAnswer {
            warn!(state = %self.state, "ignoring unexpected answer");
            out.push(NegotiationOutcome::Warning(NegotiationError::UnexpectedSignal {
                state: self.state,
                kind: "answer",
            }));
            return;
        }

        match self.transport.accept_answer(sdp).await {
            Ok(()) => {
                self.remote_description_set = true;
                self.flush_pending(out).await;
                if self.state == NegotiationState::AwaitingAnswer {
                    self.deadline = None;
                    self.transition(NegotiationState::Connected, out);
                }
            }
            Err(e) => {
                self.fail(NegotiationError::RemoteDescriptionRejected(e.0), out)
                    .await
            }
        }
    }

    async fn on_remote_candidate(
        &mut self,
        candidate: IceCandidate,
        out: &mut Vec<NegotiationOutcome>,
    ) {
        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            debug!(
                pending = self.pending_candidates.len(),
                "buffered remote candidate until the remote description is set"
            );
            return;
        }
        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            self.fail(NegotiationError::CandidateRejected(e.0), out).await;
        }
    }

    /// Applies buffered candidates in arrival order.
    async fn flush_pending(&mut self, out: &mut Vec<NegotiationOutcome>) {
        if self.pending_candidates.is_empty() {
            return;
        }
        debug!(count = self.pending_candidates.len(), "applying buffered candidates");
        let pending = std::mem::take(&mut self.pending_candidates);
        for candidate in pending {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                self.fail(NegotiationError::CandidateRejected(e.0), out).await;
                return;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    async fn on_tick(&mut self, now: Instant, out: &mut Vec<NegotiationOutcome>) {
        if !self.state.is_timed() {
            return;
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.fail(NegotiationError::Timeout(self.config.timeout), out)
                .await;
        }
    }

    async fn close(&mut self, out: &mut Vec<NegotiationOutcome>) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.teardown().await;
        self.transition(NegotiationState::Closed, out);
    }

    async fn fail(&mut self, err: NegotiationError, out: &mut Vec<NegotiationOutcome>) {
        if self.state.is_terminal() {
            debug!(state = %self.state, error = %err, "ignoring failure on finished session");
            return;
        }
        warn!(state = %self.state, error = %err, "negotiation failed");
        self.teardown().await;
        self.transition(NegotiationState::Failed, out);
        out.push(NegotiationOutcome::Failed(err));
    }

    async fn teardown(&mut self) {
        self.pending_candidates.clear();
        self.remote_description_set = false;
        self.deadline = None;
        if self.state != NegotiationState::Failed {
            if let Err(e) = self.transport.close().await {
                warn!("transport close failed: {e}");
            }
        }
    }

    fn transition(&mut self, to: NegotiationState, out: &mut Vec<NegotiationOutcome>) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "negotiation state changed");
        self.state = to;
        out.push(NegotiationOutcome::StateChanged { from, to });
    }

    fn require(&self, expected: NegotiationState, event: &'static str) -> Result<(), NegotiationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(NegotiationError::InvalidTransition {
                state: self.state,
                event,
            })
        }
    }

    fn arm_deadline(&mut self) {
        self.deadline = Some(Instant::now() + self.config.timeout);
    }

    /// Collision rule: the greater peer id wins; an offer without an id
    /// never beats the local one.
    fn remote_wins(&self, remote_peer_id: Option<&str>) -> bool {
        remote_peer_id.is_some_and(|remote| remote > self.local_peer_id.as_str())
    }
}
