use anyhow::Context;
use tokio_util::sync::CancellationToken;

use sendit_relay_server::{RelayServer, ServerConfig};

/// Runs the relay until Ctrl-C.
pub async fn run(port: u16) -> anyhow::Result<()> {
    let config = ServerConfig {
        port,
        ..ServerConfig::default()
    };
    let server = RelayServer::bind(&config)
        .await
        .with_context(|| format!("bind relay on port {port}"))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for Ctrl-C: {e}");
                return;
            }
            tracing::info!("interrupted, shutting down");
            cancel.cancel();
        }
    });

    server.run(cancel).await.context("relay server")
}
