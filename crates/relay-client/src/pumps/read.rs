//! Relay read pump: turns socket traffic into [`RelayEvent`]s.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use sendit_protocol::SignalingMessage;
use sendit_protocol::constants::{RELAY_MAX_MESSAGE_SIZE, RELAY_PONG_WAIT};

use crate::RelayEvent;
use crate::pumps::PumpFailure;

/// Reads frames from the relay until the connection ends, then emits exactly
/// one terminal event.
///
/// Any inbound frame resets the pong deadline; silence for
/// [`RELAY_PONG_WAIT`] is treated as a dead connection. A cancel ends with
/// [`RelayEvent::Errored`] when the write pump recorded a `failure`, and with
/// [`RelayEvent::Closed`] otherwise.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: mpsc::Sender<RelayEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    failure: PumpFailure,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(RELAY_PONG_WAIT);
    tokio::pin!(pong_deadline);

    let terminal = loop {
        tokio::select! {
            _ = cancel.cancelled() => match failure.take() {
                Some(reason) => break RelayEvent::Errored(reason),
                None => break RelayEvent::Closed,
            },

            () = &mut pong_deadline => {
                warn!("relay pong timeout, connection dead");
                break RelayEvent::Errored("relay connection timed out".into());
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline
                            .as_mut()
                            .reset(tokio::time::Instant::now() + RELAY_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if let Some(event) = handle_text_message(text.as_str()) {
                                    if events_tx.send(event).await.is_err() {
                                        debug!("relay event receiver dropped");
                                        break RelayEvent::Closed;
                                    }
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "relay sent close frame");
                                break RelayEvent::Closed;
                            }
                            _ => {
                                warn!("ignoring non-text relay frame");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("relay read error: {e}");
                        break RelayEvent::Errored(e.to_string());
                    }
                    None => {
                        debug!("relay stream ended");
                        break RelayEvent::Closed;
                    }
                }
            }
        }
    };

    cancel.cancel();
    let _ = events_tx.send(terminal).await;
}

/// Parses one relay text frame.
///
/// Returns `None` for frames that are dropped outright (oversized).
fn handle_text_message(text: &str) -> Option<RelayEvent> {
    if text.len() > RELAY_MAX_MESSAGE_SIZE {
        warn!("relay message too large ({} bytes), dropping", text.len());
        return None;
    }

    match SignalingMessage::from_json(text) {
        Ok(msg) => {
            trace!(kind = msg.kind(), "relay message");
            Some(RelayEvent::Message(msg))
        }
        Err(e) => {
            warn!("malformed relay message: {e}");
            Some(RelayEvent::Malformed(e.to_string()))
        }
    }
}
