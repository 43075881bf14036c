//! Relay write pump: the only writer on the socket.
//!
//! Outbound signaling and keepalive pings share this task, so frames never
//! interleave and a stalled socket stops both at once.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::pumps::PumpFailure;

/// Writes queued frames, plus a ping every `ping_period`, until cancelled or
/// the queue closes. Ends with a close frame.
///
/// A failed write is recorded in `failure` before the connection is
/// cancelled, so the read pump reports it as an error.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    ping_period: Duration,
    failure: PumpFailure,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_period,
        ping_period,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
            _ = keepalive.tick() => {
                trace!("relay ping");
                tungstenite::Message::Ping(Vec::new().into())
            }
        };

        if let Err(e) = write.send(frame).await {
            error!("relay write error: {e}");
            failure.record(format!("relay write failed: {e}"));
            cancel.cancel();
            break;
        }
    }

    debug!("relay write pump stopped");
    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::{Sink, sink, stream};

    use crate::RelayEvent;
    use crate::pumps::read::read_pump;

    const PERIOD: Duration = Duration::from_secs(30);

    fn capture_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn forwards_in_order_then_closes() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);

        write_tx
            .send(tungstenite::Message::Text("one".into()))
            .await
            .unwrap();
        write_tx
            .send(tungstenite::Message::Text("two".into()))
            .await
            .unwrap();
        drop(write_tx);

        write_pump(
            capture_sink(sink_tx),
            write_rx,
            PERIOD,
            PumpFailure::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Text("one".into()))
        );
        assert_eq!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Text("two".into()))
        );
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Close(_))
        ));
    }

    #[tokio::test]
    async fn cancel_sends_close_frame() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(
            capture_sink(sink_tx),
            write_rx,
            PERIOD,
            PumpFailure::default(),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pump did not stop")
            .expect("pump panicked");

        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Close(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pings_once_per_period() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        tokio::spawn(write_pump(
            capture_sink(sink_tx),
            write_rx,
            PERIOD,
            PumpFailure::default(),
            cancel.clone(),
        ));

        tokio::time::advance(PERIOD - Duration::from_secs(1)).await;
        assert!(sink_rx.try_recv().is_err(), "no ping before the first period");

        tokio::time::advance(Duration::from_secs(2)).await;
        let msg = sink_rx.recv().await.unwrap();
        assert!(matches!(msg, tungstenite::Message::Ping(_)));
        cancel.cancel();
    }

    /// A socket whose every write fails.
    struct BrokenSocket;

    impl Sink<tungstenite::Message> for BrokenSocket {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _: tungstenite::Message) -> Result<(), Self::Error> {
            Err(tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_write_ends_the_stream_with_errored() {
        let failure = PumpFailure::default();
        let cancel = CancellationToken::new();
        let (write_tx, write_rx) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let writer = tokio::spawn(write_pump(
            BrokenSocket,
            write_rx,
            PERIOD,
            failure.clone(),
            cancel.clone(),
        ));
        let reader = tokio::spawn(read_pump(
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            events_tx,
            write_tx.clone(),
            failure,
            cancel.clone(),
        ));

        write_tx
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();

        let terminal = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .expect("no terminal event");
        assert!(
            matches!(terminal, Some(RelayEvent::Errored(ref reason)) if reason.contains("write")),
            "got {terminal:?}"
        );
        assert!(cancel.is_cancelled());
        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn caller_cancel_still_ends_with_closed() {
        let failure = PumpFailure::default();
        let cancel = CancellationToken::new();
        let (sink_tx, _sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        tokio::spawn(write_pump(
            capture_sink(sink_tx),
            write_rx,
            PERIOD,
            failure.clone(),
            cancel.clone(),
        ));
        tokio::spawn(read_pump(
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            events_tx,
            write_tx,
            failure,
            cancel.clone(),
        ));

        cancel.cancel();
        assert_eq!(events_rx.recv().await, Some(RelayEvent::Closed));
    }
}
