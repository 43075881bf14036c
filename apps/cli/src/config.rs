//! CLI configuration.
//!
//! Stored as TOML at `~/.config/sendit/config.toml` and written with
//! defaults on first run. Missing keys fall back to their defaults, so old
//! files keep loading as settings are added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use sendit_peer::PeerConfig;
use sendit_protocol::{CHUNK_SIZE, NegotiationConfig, TransferConfig};
use sendit_rtc::{DEFAULT_STUN_SERVER, RtcConfig};

/// Environment variable overriding the relay endpoint.
pub const ENDPOINT_ENV: &str = "SENDIT_ENDPOINT";

const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the relay.
    pub endpoint: String,
    /// STUN/TURN servers handed to the peer connection.
    pub ice_servers: Vec<String>,
    /// Seconds allowed for the offer/answer exchange.
    pub negotiation_timeout_secs: u64,
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub chunk_size: usize,
    /// Accepted size difference at `file-end`; 1 matches the browser client.
    pub integrity_tolerance_bytes: u64,
    pub inter_chunk_delay_ms: u64,
    pub incomplete_transfer_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            ice_servers: vec![DEFAULT_STUN_SERVER.into()],
            negotiation_timeout_secs: NegotiationConfig::default().timeout.as_secs(),
            transfer: TransferSettings::default(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        let defaults = TransferConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            integrity_tolerance_bytes: defaults.integrity_tolerance_bytes,
            inter_chunk_delay_ms: defaults.inter_chunk_delay.as_millis() as u64,
            incomplete_transfer_timeout_secs: defaults.incomplete_transfer_timeout.as_secs(),
        }
    }
}

impl Config {
    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serialize config")?;
        std::fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (1..=CHUNK_SIZE).contains(&self.transfer.chunk_size),
            "transfer.chunk_size must be between 1 and {CHUNK_SIZE}"
        );
        ensure!(
            self.negotiation_timeout_secs > 0,
            "negotiation_timeout_secs must be positive"
        );
        Ok(())
    }

    /// Relay endpoint: the command-line flag, then `SENDIT_ENDPOINT`, then
    /// the config file.
    pub fn endpoint(&self, flag: Option<&str>) -> String {
        resolve_endpoint(flag, std::env::var(ENDPOINT_ENV).ok().as_deref(), &self.endpoint)
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            negotiation: NegotiationConfig {
                timeout: Duration::from_secs(self.negotiation_timeout_secs),
            },
            transfer: TransferConfig {
                chunk_size: self.transfer.chunk_size,
                integrity_tolerance_bytes: self.transfer.integrity_tolerance_bytes,
                inter_chunk_delay: Duration::from_millis(self.transfer.inter_chunk_delay_ms),
                incomplete_transfer_timeout: Duration::from_secs(
                    self.transfer.incomplete_transfer_timeout_secs,
                ),
            },
            peer_id: None,
        }
    }

    pub fn rtc_config(&self) -> RtcConfig {
        RtcConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

fn resolve_endpoint(flag: Option<&str>, env: Option<&str>, configured: &str) -> String {
    flag.or(env.filter(|e| !e.trim().is_empty()))
        .unwrap_or(configured)
        .to_string()
}

/// `~/.config/sendit/config.toml`.
pub fn default_path() -> PathBuf {
    config_base_dir().join("sendit").join("config.toml")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
