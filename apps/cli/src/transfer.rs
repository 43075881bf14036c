//! The `send` and `receive` commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sendit_peer::{Peer, PeerEvent, PeerHandle};
use sendit_protocol::CreateRoomResponse;
use sendit_relay_client::{RelayClient, create_room_url};
use sendit_rtc::RtcTransport;
use sendit_transfer::{DirectorySink, FileSink, FsSource, TransferProgress};

use crate::config::Config;

const TRANSPORT_EVENT_BUFFER: usize = 256;

/// How long the sender keeps the connection up after the last frame while
/// waiting for the receiver to hang up.
const SEND_LINGER: Duration = Duration::from_secs(10);

struct Session {
    handle: PeerHandle,
    events: mpsc::Receiver<PeerEvent>,
    task: JoinHandle<()>,
}

/// Joins `room` and starts a peer on it.
async fn join<K: FileSink + 'static>(
    config: &Config,
    endpoint: &str,
    room: &str,
    sink: K,
) -> anyhow::Result<Session> {
    let (relay, relay_rx) = RelayClient::connect(endpoint, room)
        .await
        .with_context(|| format!("join room {room} on {endpoint}"))?;

    let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
    let transport = RtcTransport::new(config.rtc_config(), transport_tx)
        .await
        .context("create peer connection")?;

    let (peer, events) = Peer::new(config.peer_config(), Arc::new(transport), relay, sink);
    debug!(peer_id = %peer.peer_id(), "peer ready");
    let (handle, task) = peer.spawn(relay_rx, transport_rx);
    Ok(Session {
        handle,
        events,
        task,
    })
}

async fn create_room(endpoint: &str) -> anyhow::Result<String> {
    let url = create_room_url(endpoint)?;
    let response = reqwest::Client::new()
        .post(url)
        .send()
        .await
        .context("create room request")?;
    let response = response.error_for_status().context("create room response")?;
    let body: CreateRoomResponse = response.json().await.context("parse room response")?;
    Ok(body.room_id)
}

/// Waits for the remote offer, then streams `file` once the channel opens.
pub async fn send(
    config: &Config,
    endpoint: &str,
    file: &Path,
    room: Option<String>,
) -> anyhow::Result<()> {
    let source = FsSource::open(file)
        .await
        .with_context(|| format!("open {}", file.display()))?;
    let room = match room {
        Some(room) => room,
        None => create_room(endpoint).await?,
    };
    println!("Room: {room}");
    println!("On the other side run: sendit receive {room}");

    let download_dir = std::env::current_dir().context("current directory")?;
    let mut session = join(config, endpoint, &room, DirectorySink::new(download_dir)).await?;
    session.handle.await_offer().await?;

    let mut source = Some(source);
    let mut sent = false;
    let mut failure = None;

    while let Some(event) = session.events.recv().await {
        match event {
            PeerEvent::ChannelOpen => {
                if let Some(source) = source.take() {
                    info!("peer connected, sending");
                    session.handle.send_file(source).await?;
                }
            }
            PeerEvent::Progress(progress) => print_progress(&progress),
            PeerEvent::FileSent(done) => {
                finish_progress();
                println!(
                    "Sent {} ({})",
                    done.metadata.name,
                    format_bytes(done.bytes_transferred)
                );
                sent = true;
                let handle = session.handle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(SEND_LINGER).await;
                    let _ = handle.close().await;
                });
            }
            PeerEvent::ChannelClosed if sent => {
                let _ = session.handle.close().await;
            }
            PeerEvent::TransferFailed { direction, error } => {
                finish_progress();
                failure = Some(anyhow!("{direction} transfer failed: {error}"));
                let _ = session.handle.close().await;
            }
            PeerEvent::NegotiationFailed(e) => {
                failure = Some(anyhow!("connection failed: {e}"));
            }
            PeerEvent::Message(text) => println!("Peer: {text}"),
            PeerEvent::Closed => break,
            other => debug!(?other, "peer event"),
        }
    }

    session.task.await.context("peer task")?;
    if let Some(e) = failure {
        return Err(e);
    }
    if !sent {
        bail!("connection closed before the file was sent");
    }
    Ok(())
}

/// Joins `room`, starts negotiation and saves the first file that arrives.
pub async fn receive(
    config: &Config,
    endpoint: &str,
    room: &str,
    output_dir: PathBuf,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("create {}", output_dir.display()))?;
    let mut session = join(config, endpoint, room, DirectorySink::new(output_dir)).await?;
    session.handle.initiate().await?;

    let mut saved = false;
    let mut failure = None;

    while let Some(event) = session.events.recv().await {
        match event {
            PeerEvent::IncomingFile(metadata) => {
                println!(
                    "Receiving {} ({}, {})",
                    metadata.name,
                    format_bytes(metadata.size),
                    metadata.mime_type
                );
            }
            PeerEvent::Progress(progress) => print_progress(&progress),
            PeerEvent::FileReceived(file) => {
                finish_progress();
                println!("Saved {}", file.location);
                saved = true;
                let _ = session.handle.close().await;
            }
            PeerEvent::TransferFailed { direction, error } => {
                finish_progress();
                failure = Some(anyhow!("{direction} transfer failed: {error}"));
                let _ = session.handle.close().await;
            }
            PeerEvent::NegotiationFailed(e) => {
                failure = Some(anyhow!("connection failed: {e}"));
            }
            PeerEvent::Message(text) => println!("Peer: {text}"),
            PeerEvent::Closed => break,
            other => debug!(?other, "peer event"),
        }
    }

    session.task.await.context("peer task")?;
    if let Some(e) = failure {
        return Err(e);
    }
    if !saved {
        bail!("connection closed before a file arrived");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress display
// ---------------------------------------------------------------------------

fn print_progress(progress: &TransferProgress) {
    let mut err = std::io::stderr();
    let _ = write!(err, "\r{}", progress_line(progress));
    let _ = err.flush();
}

fn finish_progress() {
    eprintln!();
}

fn progress_line(p: &TransferProgress) -> String {
    let eta = match p.eta {
        Some(eta) => format!("{}s", eta.as_secs()),
        None => "--".into(),
    };
    format!(
        "{} {:5.1}%  {}/{}  {}/s  eta {}",
        p.direction,
        p.percent(),
        format_bytes(p.bytes_transferred),
        format_bytes(p.total_bytes),
        format_bytes(p.bytes_per_second as u64),
        eta
    )
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
