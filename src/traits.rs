//! Collaborator interfaces consumed by the orchestrator
//!
//! The orchestrator never talks to the ledger, the indexer or storage nodes
//! directly. It drives them through these traits, which keeps the workflows
//! testable against in-memory fakes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::types::{
    Commitment, ContentRoot, EndpointSet, NodeFilter, NodeInfo, PushReceipt, SigningCredential,
    TxRef,
};

/// Opens an authenticated connection to the commitment ledger
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &SigningCredential,
    ) -> Result<Arc<dyn ChainBinding>, ServiceError>;
}

/// Authenticated ledger connection used to record content roots
#[async_trait]
pub trait ChainBinding: Send + Sync {
    /// Submit a signed commitment and wait until the ledger accepts it
    async fn submit_commitment(
        &self,
        ctx: &TransferContext,
        commitment: &Commitment,
    ) -> Result<TxRef, ServiceError>;

    /// Release the connection; further submissions fail
    async fn close(&self);
}

/// Opens a connection to the node-index service
#[async_trait]
pub trait SelectorConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeSelector>, ServiceError>;
}

/// Node discovery and ranking.
///
/// Implementations may return fewer nodes than requested; the orchestrator
/// decides whether that is acceptable.
#[async_trait]
pub trait NodeSelector: Send + Sync {
    async fn select(
        &self,
        ctx: &TransferContext,
        min_nodes: usize,
        replica_count: usize,
        filter: Option<&NodeFilter>,
    ) -> Result<Vec<NodeInfo>, ServiceError>;
}

/// Factory for byte-level transfer sessions
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn open_uploader(
        &self,
        ctx: &TransferContext,
        chain: Arc<dyn ChainBinding>,
        endpoints: &EndpointSet,
    ) -> Result<Box<dyn UploadSession>, ServiceError>;

    async fn open_downloader(
        &self,
        endpoints: &EndpointSet,
    ) -> Result<Box<dyn DownloadSession>, ServiceError>;
}

/// Upload half of a transfer session
#[async_trait]
pub trait UploadSession: Send {
    /// Replicate the file to every endpoint and compute its content root
    async fn push(&mut self, ctx: &TransferContext, path: &Path)
        -> Result<PushReceipt, ServiceError>;

    /// Record a completed push on the ledger
    async fn commit(
        &mut self,
        ctx: &TransferContext,
        receipt: &PushReceipt,
    ) -> Result<TxRef, ServiceError>;
}

/// Download half of a transfer session
#[async_trait]
pub trait DownloadSession: Send {
    /// Fetch `root` into `output`.
    ///
    /// Implementations write to [`partial_path`] and only move the file onto
    /// `output` once every byte has arrived (and verified, when `verify` is set).
    async fn pull(
        &mut self,
        ctx: &TransferContext,
        root: &ContentRoot,
        output: &Path,
        verify: bool,
    ) -> Result<(), ServiceError>;
}

/// Collaborator set an orchestrator is built from
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainConnector>,
    pub selector: Arc<dyn SelectorConnector>,
    pub engine: Arc<dyn TransferEngine>,
}

/// Where an in-progress download is staged: `<output>.partial`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".partial");
    output.with_file_name(name)
}
