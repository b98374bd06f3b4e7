//! Data model shared by the orchestrator and its collaborators

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::OrchestratorError;

/// Length in bytes of a content root
pub const ROOT_LEN: usize = 32;

// ============================================================================
// Content Root
// ============================================================================

/// Digest identifying a file's content; the only key a downloader needs
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentRoot([u8; ROOT_LEN]);

impl ContentRoot {
    pub fn from_bytes(bytes: [u8; ROOT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_LEN] {
        &self.0
    }
}

impl fmt::Display for ContentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentRoot({})", self)
    }
}

impl FromStr for ContentRoot {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| OrchestratorError::Input(format!("invalid content root {:?}: {}", s, e)))?;

        let bytes: [u8; ROOT_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            OrchestratorError::Input(format!(
                "invalid content root {:?}: expected {} bytes, got {}",
                s,
                ROOT_LEN,
                b.len()
            ))
        })?;

        Ok(Self(bytes))
    }
}

impl Serialize for ContentRoot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentRoot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Ledger types
// ============================================================================

/// Reference to a ledger transaction (transaction hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets committed to the ledger for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub root: ContentRoot,
    pub size: u64,
    pub chunk_count: u64,
}

/// Proof that a commitment was accepted by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitmentRecord {
    pub transaction_ref: TxRef,
    pub content_root: ContentRoot,
}

/// Outcome of a successful push, before the commitment is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    pub root: ContentRoot,
    pub size: u64,
    pub chunk_count: u64,
    /// Number of nodes that acknowledged every segment
    pub replicas: usize,
}

impl PushReceipt {
    pub fn commitment(&self) -> Commitment {
        Commitment {
            root: self.root,
            size: self.size,
            chunk_count: self.chunk_count,
        }
    }
}

/// Private signing key used for ledger transactions.
///
/// The bytes never appear in `Debug` output or logs and are zeroized on drop.
#[derive(PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SigningCredential([u8; 32]);

impl SigningCredential {
    /// Parse a 32-byte hex secret, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, OrchestratorError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let decoded = Zeroizing::new(
            hex::decode(digits)
                .map_err(|_| OrchestratorError::Input("signing key is not valid hex".into()))?,
        );
        if decoded.len() != 32 {
            return Err(OrchestratorError::Input(format!(
                "signing key must be 32 bytes, got {}",
                decoded.len()
            )));
        }
        let mut credential = Self([0u8; 32]);
        credential.0.copy_from_slice(&decoded);
        Ok(credential)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub(crate) fn secret(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningCredential(<redacted>)")
    }
}

// ============================================================================
// Nodes and selection
// ============================================================================

/// Storage node advertised by the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Base URL of the node's storage API
    pub url: String,
    /// Last measured round-trip latency
    #[serde(default)]
    pub latency_ms: Option<u64>,
    /// Free-form placement hint (datacenter, region)
    #[serde(default)]
    pub region: Option<String>,
}

impl NodeInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            latency_ms: None,
            region: None,
        }
    }
}

/// Ordered, non-empty set of storage endpoints; earlier entries are preferred
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSet {
    nodes: Vec<NodeInfo>,
}

impl EndpointSet {
    /// Returns `None` for an empty list
    pub fn new(nodes: Vec<NodeInfo>) -> Option<Self> {
        if nodes.is_empty() {
            None
        } else {
            Some(Self { nodes })
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.iter()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.url.as_str()).collect()
    }
}

/// Predicate over node metadata applied during selection
#[derive(Clone)]
pub struct NodeFilter(Arc<dyn Fn(&NodeInfo) -> bool + Send + Sync>);

impl NodeFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&NodeInfo) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn accepts(&self, node: &NodeInfo) -> bool {
        (self.0)(node)
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeFilter(..)")
    }
}

/// How many nodes a transfer needs, and which nodes qualify
#[derive(Debug, Clone)]
pub struct ReplicationPolicy {
    min_nodes: usize,
    replica_count: usize,
    filter: Option<NodeFilter>,
}

impl ReplicationPolicy {
    /// `replica_count` must be at least 1
    pub fn new(replica_count: usize) -> Result<Self, OrchestratorError> {
        if replica_count == 0 {
            return Err(OrchestratorError::Input(
                "replica count must be at least 1".into(),
            ));
        }
        Ok(Self {
            min_nodes: 1,
            replica_count,
            filter: None,
        })
    }

    pub fn with_filter(mut self, filter: NodeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn min_nodes(&self) -> usize {
        self.min_nodes
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub fn filter(&self) -> Option<&NodeFilter> {
        self.filter.as_ref()
    }
}
