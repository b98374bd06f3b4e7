//! Client configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::OrchestratorError;

/// Indexer endpoint tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerTier {
    /// Cheaper, slower
    Standard,
    /// Faster, more expensive
    Turbo,
}

impl IndexerTier {
    pub fn from_turbo_flag(turbo: bool) -> Self {
        if turbo {
            IndexerTier::Turbo
        } else {
            IndexerTier::Standard
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Ledger RPC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the ledger
    #[serde(default = "default_chain_rpc")]
    pub rpc_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub request_timeout_secs: u64,

    /// Interval between receipt polls while waiting for confirmation
    #[serde(default = "default_confirm_poll")]
    pub confirm_poll_ms: u64,
}

/// Node-index service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_standard")]
    pub standard_url: String,

    #[serde(default = "default_indexer_turbo")]
    pub turbo_url: String,

    #[serde(default = "default_rpc_timeout")]
    pub request_timeout_secs: u64,
}

/// Transfer policy and engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Deadline for a whole upload, selection through commitment
    #[serde(default = "default_transfer_timeout")]
    pub upload_timeout_secs: u64,

    /// Deadline for a whole download
    #[serde(default = "default_transfer_timeout")]
    pub download_timeout_secs: u64,

    /// Nodes that must hold a replica of every upload
    #[serde(default = "default_upload_replicas")]
    pub upload_replicas: usize,

    /// Nodes requested when downloading (one healthy source is enough)
    #[serde(default = "default_download_replicas")]
    pub download_replicas: usize,

    /// Segment size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-request timeout against storage nodes
    #[serde(default = "default_node_timeout")]
    pub request_timeout_secs: u64,
}

// Defaults
fn default_chain_rpc() -> String { "https://evmrpc-testnet.0g.ai".to_string() }
fn default_indexer_standard() -> String { "https://indexer-storage-testnet-standard.0g.ai".to_string() }
fn default_indexer_turbo() -> String { "https://indexer-storage-testnet-turbo.0g.ai".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_confirm_poll() -> u64 { 1000 }
fn default_transfer_timeout() -> u64 { 300 } // 5 minutes
fn default_upload_replicas() -> usize { 3 }
fn default_download_replicas() -> usize { 1 }
fn default_chunk_size() -> usize { 256 * 1024 }
fn default_node_timeout() -> u64 { 60 }

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_chain_rpc(),
            request_timeout_secs: default_rpc_timeout(),
            confirm_poll_ms: default_confirm_poll(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            standard_url: default_indexer_standard(),
            turbo_url: default_indexer_turbo(),
            request_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            upload_timeout_secs: default_transfer_timeout(),
            download_timeout_secs: default_transfer_timeout(),
            upload_replicas: default_upload_replicas(),
            download_replicas: default_download_replicas(),
            chunk_size: default_chunk_size(),
            request_timeout_secs: default_node_timeout(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, OrchestratorError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Input(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| OrchestratorError::Input(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Indexer URL for the chosen tier
    pub fn indexer_url(&self, tier: IndexerTier) -> &str {
        match tier {
            IndexerTier::Standard => &self.indexer.standard_url,
            IndexerTier::Turbo => &self.indexer.turbo_url,
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.upload_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.download_timeout_secs)
    }
}
