use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use myftp_abstract::TransferConfig;

pub const DEFAULT_SERVER_PORT: u16 = 5005;
pub const DEFAULT_CLIENT_PORT: u16 = 5006;

/// Settings of one `myftp` process, read from an optional TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub bind_addr: String,
    pub server_port: u16,
    pub client_port: u16,
    /// Directory files are served from.
    pub serve_dir: PathBuf,
    /// Directory received files are written to.
    pub download_dir: PathBuf,
    pub transfer: TransferConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            serve_dir: PathBuf::from("."),
            download_dir: PathBuf::from("out"),
            transfer: TransferConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_addr: Option<String>,
    pub server_port: Option<u16>,
    pub client_port: Option<u16>,
    pub serve_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub ack_timeout_ms: Option<u64>,
    pub linger_ms: Option<u64>,
}

impl Overrides {
    pub fn apply_to(self, config: &mut NodeConfig) {
        if let Some(v) = self.bind_addr {
            config.bind_addr = v;
        }
        if let Some(v) = self.server_port {
            config.server_port = v;
        }
        if let Some(v) = self.client_port {
            config.client_port = v;
        }
        if let Some(v) = self.serve_dir {
            config.serve_dir = v;
        }
        if let Some(v) = self.download_dir {
            config.download_dir = v;
        }
        if let Some(v) = self.ack_timeout_ms {
            config.transfer.ack_timeout_ms = v;
        }
        if let Some(v) = self.linger_ms {
            config.transfer.linger_ms = v;
        }
    }
}
