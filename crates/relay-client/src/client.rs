//! WebSocket client for the room relay.
//!
//! One connection per room. A write pump serialises outbound signaling and
//! keepalive pings; a read pump turns inbound traffic into [`RelayEvent`]s.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sendit_protocol::SignalingMessage;
use sendit_protocol::constants::{RELAY_MAX_MESSAGE_SIZE, RELAY_PING_PERIOD};

use crate::endpoint::relay_ws_url;
use crate::pumps::PumpFailure;
use crate::{EVENT_BUFFER_SIZE, RelayError, RelayEvent, WRITE_BUFFER_SIZE};

/// A connection to one room on the relay.
///
/// Dropping the client tears the connection down; the event stream then
/// ends with [`RelayEvent::Closed`].
pub struct RelayClient {
    room_id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl RelayClient {
    /// Joins `room_id` on the relay at `endpoint`.
    ///
    /// Returns the client and its event stream. The first event is always
    /// [`RelayEvent::Opened`]; the last is [`RelayEvent::Closed`] or
    /// [`RelayEvent::Errored`].
    pub async fn connect(
        endpoint: &str,
        room_id: &str,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>), RelayError> {
        let url = relay_ws_url(endpoint, room_id)?;

        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(RELAY_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(RELAY_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                .await?;
        info!(room = %room_id, "relay connected");

        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_BUFFER_SIZE);
        let (events_tx, events_rx) = mpsc::channel::<RelayEvent>(EVENT_BUFFER_SIZE);
        let cancel = CancellationToken::new();
        let failure = PumpFailure::default();

        // Queued before the read pump starts so it is always first.
        events_tx
            .send(RelayEvent::Opened)
            .await
            .map_err(|_| RelayError::Closed)?;

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                write,
                write_rx,
                RELAY_PING_PERIOD,
                failure.clone(),
                cancel,
            ))
        };

        let read_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, events_tx, write_tx, failure, cancel,
            ))
        };

        let client = Self {
            room_id: room_id.trim().to_string(),
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        };
        Ok((client, events_rx))
    }

    /// Room this client is joined to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Sends a signaling message to the other peer in the room.
    pub async fn send(&self, msg: &SignalingMessage) -> Result<(), RelayError> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::Closed);
        }
        let json = msg.to_json()?;
        debug!(kind = msg.kind(), room = %self.room_id, "relay send");
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| RelayError::Closed)
    }

    /// `true` until [`close`](Self::close) is called or a pump stops.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.write_tx.is_closed()
    }

    /// Closes the connection. Safe to call more than once.
    pub async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(room = %self.room_id, "closing relay connection");
        self.cancel.cancel();
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        // The read and write pumps exit on their own once cancelled so the
        // terminal event and the close frame still go out.
    }
}
