//! Transfer orchestrator
//!
//! Holds one Chain Binding, one Node Selector and a transfer engine, and runs
//! the two workflows:
//!
//! - upload: select nodes, open an upload session, push, then commit the
//!   content root on the ledger
//! - download: select nodes, prepare the output directory, open a download
//!   session and pull with verification on
//!
//! Each call gets its own `TransferContext`; every collaborator call runs
//! inside it, so one deadline bounds the whole workflow and dropping the
//! context on any exit path cancels whatever is still in flight.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chain::RpcChainConnector;
use crate::config::{Config, IndexerTier, TransferConfig};
use crate::context::{CancelToken, Interrupted, TransferContext};
use crate::engine::HttpTransferEngine;
use crate::error::{Collaborator, OrchestratorError, Result, ServiceError, Step};
use crate::indexer::IndexerConnector;
use crate::selection::enforce_policy;
use crate::traits::{partial_path, ChainBinding, Collaborators, NodeSelector, TransferEngine};
use crate::types::{CommitmentRecord, ContentRoot, EndpointSet, ReplicationPolicy, SigningCredential};

/// Downloads are always verified against the requested content root
const VERIFY: bool = true;

pub struct Orchestrator {
    chain: Arc<dyn ChainBinding>,
    selector: Arc<dyn NodeSelector>,
    engine: Arc<dyn TransferEngine>,
    settings: TransferConfig,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Connect the JSON-RPC ledger, the indexer for `tier` and the HTTP engine
    pub async fn connect(
        config: &Config,
        credential: &SigningCredential,
        tier: IndexerTier,
    ) -> Result<Self> {
        let engine = HttpTransferEngine::new(&config.transfer).map_err(|e| {
            OrchestratorError::Input(format!("invalid transfer settings: {}", e))
        })?;

        let collaborators = Collaborators {
            chain: Arc::new(RpcChainConnector::new(&config.chain)),
            selector: Arc::new(IndexerConnector::new(&config.indexer)),
            engine: Arc::new(engine),
        };

        Self::open(config, credential, tier, collaborators).await
    }

    /// Connect the Chain Binding, then the Node Selector.
    ///
    /// Either both connections succeed or neither is kept: a selector failure
    /// closes the chain connection before the error is returned.
    pub async fn open(
        config: &Config,
        credential: &SigningCredential,
        tier: IndexerTier,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let chain_url = config.chain.rpc_url.as_str();
        let chain = collaborators
            .chain
            .connect(chain_url, credential)
            .await
            .map_err(|e| OrchestratorError::Connection {
                collaborator: Collaborator::Chain,
                message: e.to_string(),
            })?;

        let indexer_url = config.indexer_url(tier);
        let selector = match collaborators.selector.connect(indexer_url).await {
            Ok(selector) => selector,
            Err(e) => {
                warn!(endpoint = %indexer_url, error = %e, "Indexer connection failed, closing chain binding");
                chain.close().await;
                return Err(OrchestratorError::Connection {
                    collaborator: Collaborator::Indexer,
                    message: e.to_string(),
                });
            }
        };

        info!(chain = %chain_url, indexer = %indexer_url, tier = ?tier, "Orchestrator ready");

        Ok(Self {
            chain,
            selector,
            engine: collaborators.engine,
            settings: config.transfer.clone(),
            cancel: CancelToken::new(),
        })
    }

    /// Handle that cancels every in-flight and future call on this orchestrator
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.upload_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.download_timeout_secs)
    }

    /// Release the Chain Binding
    pub async fn close(&self) {
        self.chain.close().await;
        debug!("Orchestrator closed");
    }

    /// Upload with the configured replica count
    pub async fn upload_default(&self, path: &Path) -> Result<CommitmentRecord> {
        let policy = ReplicationPolicy::new(self.settings.upload_replicas)?;
        self.upload(path, &policy).await
    }

    /// Download with the configured replica count
    pub async fn download_default(&self, root: &ContentRoot, output: &Path) -> Result<PathBuf> {
        let policy = ReplicationPolicy::new(self.settings.download_replicas)?;
        self.download(root, output, &policy).await
    }

    /// Replicate `path` to `policy.replica_count()` nodes and commit its root
    pub async fn upload(&self, path: &Path, policy: &ReplicationPolicy) -> Result<CommitmentRecord> {
        check_source(path).await?;

        let ctx = TransferContext::with_parent(self.upload_timeout(), &self.cancel);
        info!(
            path = %path.display(),
            replicas = policy.replica_count(),
            timeout = ?ctx.timeout(),
            "Starting upload"
        );

        let endpoints = self.select(&ctx, policy).await?;

        let mut session = bounded(
            &ctx,
            Step::SessionOpen,
            None,
            self.engine.open_uploader(&ctx, self.chain.clone(), &endpoints),
        )
        .await?;

        let receipt = bounded(&ctx, Step::Push, None, session.push(&ctx, path)).await?;
        debug!(root = %receipt.root, replicas = receipt.replicas, "Push complete");

        let transaction_ref = bounded(
            &ctx,
            Step::Commit,
            Some(&receipt.root),
            session.commit(&ctx, &receipt),
        )
        .await?;

        info!(root = %receipt.root, tx = %transaction_ref, "Upload committed");

        Ok(CommitmentRecord {
            transaction_ref,
            content_root: receipt.root,
        })
    }

    /// Fetch `root` into `output`, creating missing parent directories.
    ///
    /// Returns the path written. A failed pull leaves nothing at `output` or at
    /// its `.partial` staging sibling; earlier failures touch neither.
    pub async fn download(
        &self,
        root: &ContentRoot,
        output: &Path,
        policy: &ReplicationPolicy,
    ) -> Result<PathBuf> {
        if output.file_name().is_none() {
            return Err(OrchestratorError::Input(format!(
                "output path {} does not name a file",
                output.display()
            )));
        }
        if let Ok(metadata) = tokio::fs::metadata(output).await {
            if metadata.is_dir() {
                return Err(OrchestratorError::Input(format!(
                    "output path {} is a directory",
                    output.display()
                )));
            }
        }

        let ctx = TransferContext::with_parent(self.download_timeout(), &self.cancel);
        info!(
            root = %root,
            output = %output.display(),
            replicas = policy.replica_count(),
            timeout = ?ctx.timeout(),
            "Starting download"
        );

        let endpoints = self.select(&ctx, policy).await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestratorError::Input(format!(
                    "cannot create output directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut session = bounded(
            &ctx,
            Step::SessionOpen,
            None,
            self.engine.open_downloader(&endpoints),
        )
        .await?;

        // From here on the session may have staged bytes at `<output>.partial`
        let result = bounded(
            &ctx,
            Step::Pull,
            Some(root),
            session.pull(&ctx, root, output, VERIFY),
        )
        .await;
        drop(session);
        drop(ctx);

        match result {
            Ok(()) => {
                info!(root = %root, output = %output.display(), "Download complete");
                Ok(output.to_path_buf())
            }
            Err(e) => {
                discard_partial(output).await;
                warn!(root = %root, error = %e, "Download failed");
                Err(e)
            }
        }
    }

    /// Ask the selector for nodes and hold the answer to the policy
    async fn select(&self, ctx: &TransferContext, policy: &ReplicationPolicy) -> Result<EndpointSet> {
        let nodes = bounded(
            ctx,
            Step::Selection,
            None,
            self.selector.select(
                ctx,
                policy.min_nodes(),
                policy.replica_count(),
                policy.filter(),
            ),
        )
        .await?;

        enforce_policy(nodes, policy)
    }
}

/// Run one collaborator call inside `ctx`, tagging any failure with `step`
async fn bounded<T, F>(
    ctx: &TransferContext,
    step: Step,
    root: Option<&ContentRoot>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ServiceError>>,
{
    match ctx.run(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(OrchestratorError::from_service(step, root, e)),
        Err(Interrupted::DeadlineExceeded) => Err(OrchestratorError::Timeout {
            step,
            after: ctx.timeout(),
        }),
        Err(Interrupted::Cancelled) => Err(OrchestratorError::Cancelled { step }),
    }
}

/// Upload source must exist, be a regular file and be readable
async fn check_source(path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        OrchestratorError::Input(format!("cannot access {}: {}", path.display(), e))
    })?;
    if metadata.is_dir() {
        return Err(OrchestratorError::Input(format!(
            "{} is a directory",
            path.display()
        )));
    }
    tokio::fs::File::open(path).await.map_err(|e| {
        OrchestratorError::Input(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(())
}

async fn discard_partial(output: &Path) {
    let staging = partial_path(output);
    match tokio::fs::remove_file(&staging).await {
        Ok(()) => debug!(path = %staging.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %staging.display(), error = %e, "Failed to remove partial download"),
    }
}
