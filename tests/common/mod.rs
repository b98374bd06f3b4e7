//! In-memory collaborators for orchestrator tests
//!
//! One `FakeNetwork` backs the chain, the selector and the engine. Content is
//! stored under its real Merkle root so round trips exercise the same content
//! addressing as the HTTP engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use replica_transfer::config::Config;
use replica_transfer::context::TransferContext;
use replica_transfer::merkle::{self, MerkleTree};
use replica_transfer::traits::{
    partial_path, ChainBinding, ChainConnector, Collaborators, DownloadSession, NodeSelector,
    SelectorConnector, TransferEngine, UploadSession,
};
use replica_transfer::types::{Commitment, PushReceipt};
use replica_transfer::{
    ContentRoot, EndpointSet, IndexerTier, NodeFilter, NodeInfo, Orchestrator, OrchestratorError,
    ServiceError, SigningCredential, TxRef,
};

const CHUNK: usize = 4;

/// Failure modes a test can switch on
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub chain_connect_fails: bool,
    pub selector_connect_fails: bool,
    pub selector_hangs: bool,
    pub session_open_fails: bool,
    pub push_fails: bool,
    pub push_hangs: bool,
    pub commit_rejected: bool,
    pub commit_hangs: bool,
    pub corrupt_data: bool,
    pub pull_hangs_after_partial: bool,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub chain_closed: AtomicUsize,
    pub commits: AtomicUsize,
    pub selections: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_dropped: AtomicUsize,
}

pub struct FakeNetwork {
    pub nodes: Vec<NodeInfo>,
    pub behavior: Behavior,
    pub counters: Counters,
    store: Mutex<HashMap<ContentRoot, Vec<u8>>>,
    events: Mutex<Vec<&'static str>>,
}

impl FakeNetwork {
    pub fn new(node_count: usize, behavior: Behavior) -> Arc<Self> {
        let nodes = (0..node_count)
            .map(|i| NodeInfo::new(format!("http://node-{}:5678", i)))
            .collect();
        Arc::new(Self {
            nodes,
            behavior,
            counters: Counters::default(),
            store: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy(node_count: usize) -> Arc<Self> {
        Self::new(node_count, Behavior::default())
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            chain: Arc::new(FakeChainConnector { net: self.clone() }),
            selector: Arc::new(FakeSelectorConnector { net: self.clone() }),
            engine: Arc::new(FakeEngine { net: self.clone() }),
        }
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn stored(&self, root: &ContentRoot) -> bool {
        self.store.lock().unwrap().contains_key(root)
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_dropped(&self) -> usize {
        self.counters.sessions_dropped.load(Ordering::SeqCst)
    }

    pub fn chain_closed(&self) -> usize {
        self.counters.chain_closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn content_root(data: &[u8]) -> ContentRoot {
    MerkleTree::from_segments(merkle::segments(data, CHUNK)).root()
}

pub fn credential() -> SigningCredential {
    SigningCredential::from_bytes([9u8; 32])
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.transfer.upload_timeout_secs = 5;
    config.transfer.download_timeout_secs = 5;
    config
}

pub async fn open(net: &Arc<FakeNetwork>) -> Result<Orchestrator, OrchestratorError> {
    Orchestrator::open(
        &test_config(),
        &credential(),
        IndexerTier::Standard,
        net.collaborators(),
    )
    .await
}

// =============================================================================
// Chain
// =============================================================================

struct FakeChainConnector {
    net: Arc<FakeNetwork>,
}

#[async_trait]
impl ChainConnector for FakeChainConnector {
    async fn connect(
        &self,
        _endpoint: &str,
        _credential: &SigningCredential,
    ) -> Result<Arc<dyn ChainBinding>, ServiceError> {
        if self.net.behavior.chain_connect_fails {
            return Err(ServiceError::Network("ledger unreachable".into()));
        }
        Ok(Arc::new(FakeChain {
            net: self.net.clone(),
        }))
    }
}

struct FakeChain {
    net: Arc<FakeNetwork>,
}

#[async_trait]
impl ChainBinding for FakeChain {
    async fn submit_commitment(
        &self,
        _ctx: &TransferContext,
        commitment: &Commitment,
    ) -> Result<TxRef, ServiceError> {
        self.net.record("commit");
        if self.net.behavior.commit_hangs {
            std::future::pending::<()>().await;
        }
        let n = self.net.counters.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.net.behavior.commit_rejected {
            return Err(ServiceError::Rejected("transaction reverted".into()));
        }
        assert!(
            self.net.stored(&commitment.root),
            "commitment submitted before content was stored"
        );
        Ok(TxRef::new(format!("0x{:064x}", n)))
    }

    async fn close(&self) {
        self.net.counters.chain_closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Selector
// =============================================================================

struct FakeSelectorConnector {
    net: Arc<FakeNetwork>,
}

#[async_trait]
impl SelectorConnector for FakeSelectorConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Arc<dyn NodeSelector>, ServiceError> {
        if self.net.behavior.selector_connect_fails {
            return Err(ServiceError::Network("indexer unreachable".into()));
        }
        Ok(Arc::new(FakeSelector {
            net: self.net.clone(),
        }))
    }
}

struct FakeSelector {
    net: Arc<FakeNetwork>,
}

#[async_trait]
impl NodeSelector for FakeSelector {
    async fn select(
        &self,
        _ctx: &TransferContext,
        _min_nodes: usize,
        replica_count: usize,
        filter: Option<&NodeFilter>,
    ) -> Result<Vec<NodeInfo>, ServiceError> {
        self.net.counters.selections.fetch_add(1, Ordering::SeqCst);
        if self.net.behavior.selector_hangs {
            std::future::pending::<()>().await;
        }
        Ok(self
            .net
            .nodes
            .iter()
            .filter(|n| filter.map_or(true, |f| f.accepts(n)))
            .take(replica_count)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Engine
// =============================================================================

struct FakeEngine {
    net: Arc<FakeNetwork>,
}

/// Counts session teardown
struct SessionGuard {
    net: Arc<FakeNetwork>,
}

impl SessionGuard {
    fn open(net: &Arc<FakeNetwork>) -> Self {
        net.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Self { net: net.clone() }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.net.counters.sessions_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferEngine for FakeEngine {
    async fn open_uploader(
        &self,
        _ctx: &TransferContext,
        chain: Arc<dyn ChainBinding>,
        endpoints: &EndpointSet,
    ) -> Result<Box<dyn UploadSession>, ServiceError> {
        if self.net.behavior.session_open_fails {
            return Err(ServiceError::Network("no node accepted the session".into()));
        }
        Ok(Box::new(FakeUpload {
            net: self.net.clone(),
            chain,
            replicas: endpoints.len(),
            _guard: SessionGuard::open(&self.net),
        }))
    }

    async fn open_downloader(
        &self,
        _endpoints: &EndpointSet,
    ) -> Result<Box<dyn DownloadSession>, ServiceError> {
        if self.net.behavior.session_open_fails {
            return Err(ServiceError::Network("no node accepted the session".into()));
        }
        Ok(Box::new(FakeDownload {
            net: self.net.clone(),
            _guard: SessionGuard::open(&self.net),
        }))
    }
}

struct FakeUpload {
    net: Arc<FakeNetwork>,
    chain: Arc<dyn ChainBinding>,
    replicas: usize,
    _guard: SessionGuard,
}

#[async_trait]
impl UploadSession for FakeUpload {
    async fn push(
        &mut self,
        _ctx: &TransferContext,
        path: &Path,
    ) -> Result<PushReceipt, ServiceError> {
        self.net.record("push");
        if self.net.behavior.push_fails {
            return Err(ServiceError::Network("node-1 dropped the connection".into()));
        }
        if self.net.behavior.push_hangs {
            std::future::pending::<()>().await;
        }
        let data = tokio::fs::read(path).await?;
        let root = content_root(&data);
        let chunk_count = merkle::segments(&data, CHUNK).len() as u64;
        self.net.store.lock().unwrap().insert(root, data.clone());
        Ok(PushReceipt {
            root,
            size: data.len() as u64,
            chunk_count,
            replicas: self.replicas,
        })
    }

    async fn commit(
        &mut self,
        ctx: &TransferContext,
        receipt: &PushReceipt,
    ) -> Result<TxRef, ServiceError> {
        self.chain.submit_commitment(ctx, &receipt.commitment()).await
    }
}

struct FakeDownload {
    net: Arc<FakeNetwork>,
    _guard: SessionGuard,
}

#[async_trait]
impl DownloadSession for FakeDownload {
    async fn pull(
        &mut self,
        _ctx: &TransferContext,
        root: &ContentRoot,
        output: &Path,
        verify: bool,
    ) -> Result<(), ServiceError> {
        let staging = partial_path(output);

        if self.net.behavior.pull_hangs_after_partial {
            tokio::fs::write(&staging, b"first segment").await?;
            std::future::pending::<()>().await;
        }

        let stored = self.net.store.lock().unwrap().get(root).cloned();
        let mut data = stored.ok_or_else(|| ServiceError::NotFound(root.to_string()))?;

        if self.net.behavior.corrupt_data {
            if let Some(byte) = data.first_mut() {
                *byte ^= 0xff;
            }
        }
        if verify && content_root(&data) != *root {
            return Err(ServiceError::Integrity(format!(
                "content does not hash to {}",
                root
            )));
        }

        tokio::fs::write(&staging, &data).await?;
        tokio::fs::rename(&staging, output).await?;
        Ok(())
    }
}
