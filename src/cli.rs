//! Command-line surface
//!
//! Flags are parsed by clap, then `Cli::validate` turns them into an
//! `Invocation`. Validation happens before any config is read or any
//! connection is attempted.

use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::IndexerTier;
use crate::error::OrchestratorError;
use crate::types::{ContentRoot, SigningCredential};

#[derive(Debug, Parser)]
#[command(name = "replica-transfer")]
#[command(about = "Upload and download files on a replicated content-addressed storage network")]
pub struct Cli {
    /// Hex-encoded signing key for ledger commitments
    #[arg(long, env = "REPLICA_TRANSFER_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// File to upload
    #[arg(long, value_name = "PATH")]
    pub upload: Option<PathBuf>,

    /// Content root to download
    #[arg(long, value_name = "ROOT")]
    pub download: Option<String>,

    /// Where to write a download
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Use the turbo indexer tier
    #[arg(long)]
    pub turbo: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "replica-transfer.toml")]
    pub config: PathBuf,

    /// Replica count (overrides config file)
    #[arg(long)]
    pub replicas: Option<usize>,

    /// Transfer deadline in seconds (overrides config file)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Upload { path: PathBuf },
    Download { root: ContentRoot, output: PathBuf },
}

/// Validated command line
#[derive(Debug)]
pub struct Invocation {
    pub credential: SigningCredential,
    pub intent: Intent,
    pub tier: IndexerTier,
    pub config_path: PathBuf,
    pub replicas: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Cli {
    pub fn validate(self) -> Result<Invocation, OrchestratorError> {
        // Wiped on every return path, including early validation errors
        let key = self.key.map(Zeroizing::new);

        let intent = match (self.upload, self.download) {
            (Some(_), Some(_)) => {
                return Err(OrchestratorError::Input(
                    "choose either --upload or --download, not both".into(),
                ))
            }
            (None, None) => {
                return Err(OrchestratorError::Input(
                    "one of --upload or --download is required".into(),
                ))
            }
            (Some(path), None) => Intent::Upload { path },
            (None, Some(root)) => {
                let output = self.output.ok_or_else(|| {
                    OrchestratorError::Input("--download requires --output".into())
                })?;
                Intent::Download {
                    root: root.parse()?,
                    output,
                }
            }
        };

        let key = key.ok_or_else(|| OrchestratorError::Input("--key is required".into()))?;
        let credential = SigningCredential::from_hex(&key)?;
        drop(key);

        if self.replicas == Some(0) {
            return Err(OrchestratorError::Input(
                "--replicas must be at least 1".into(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(OrchestratorError::Input(
                "--timeout-secs must be at least 1".into(),
            ));
        }

        Ok(Invocation {
            credential,
            intent,
            tier: IndexerTier::from_turbo_flag(self.turbo),
            config_path: self.config,
            replicas: self.replicas,
            timeout_secs: self.timeout_secs,
        })
    }
}
