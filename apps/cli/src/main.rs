//! `sendit`: peer-to-peer file transfer over WebRTC.

mod config;
mod relay;
mod transfer;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "sendit")]
#[command(about = "Peer-to-peer file transfer")]
struct Cli {
    /// Config file (default: ~/.config/sendit/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the signaling relay
    Relay {
        #[arg(long, default_value_t = sendit_relay_server::DEFAULT_PORT)]
        port: u16,
    },
    /// Send a file to whoever joins the room
    Send {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Existing room to use instead of creating one
        #[arg(long, value_name = "ID")]
        room: Option<String>,
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
    },
    /// Join a room and save the file sent there
    Receive {
        #[arg(value_name = "ROOM")]
        room: String,
        #[arg(long, default_value = ".", value_name = "DIR")]
        output_dir: PathBuf,
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_path);
    let config = Config::load_or_create(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    match cli.command {
        Command::Relay { port } => relay::run(port).await,
        Command::Send {
            file,
            room,
            endpoint,
        } => {
            let endpoint = config.endpoint(endpoint.as_deref());
            transfer::send(&config, &endpoint, &file, room).await
        }
        Command::Receive {
            room,
            output_dir,
            endpoint,
        } => {
            let endpoint = config.endpoint(endpoint.as_deref());
            transfer::receive(&config, &endpoint, &room, output_dir).await
        }
    }
}
