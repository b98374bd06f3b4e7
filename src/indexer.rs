//! Node-index service client
//!
//! The indexer advertises storage nodes through `indexer_getNodes`. Selection
//! filters that list, ranks by measured latency (unknown latency last, ties keep
//! the indexer's order) and returns the best `replica_count` nodes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::IndexerConfig;
use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::rpc::RpcClient;
use crate::traits::{NodeSelector, SelectorConnector};
use crate::types::{NodeFilter, NodeInfo};

const GET_NODES: &str = "indexer_getNodes";

pub struct IndexerConnector {
    request_timeout: Duration,
}

impl IndexerConnector {
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl SelectorConnector for IndexerConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeSelector>, ServiceError> {
        let client = IndexerClient {
            rpc: RpcClient::new(endpoint, self.request_timeout)?,
        };

        // Handshake: the endpoint must answer the node listing call
        let nodes = client.list_nodes().await?;
        info!(endpoint = %endpoint, nodes = nodes.len(), "Connected to indexer");

        Ok(Arc::new(client))
    }
}

/// JSON-RPC indexer connection
pub struct IndexerClient {
    rpc: RpcClient,
}

impl IndexerClient {
    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ServiceError> {
        self.rpc.call(GET_NODES, Vec::<()>::new()).await
    }
}

/// Filter, rank and truncate an advertised node list
pub fn rank_nodes(
    nodes: Vec<NodeInfo>,
    replica_count: usize,
    filter: Option<&NodeFilter>,
) -> Vec<NodeInfo> {
    let mut candidates: Vec<NodeInfo> = nodes
        .into_iter()
        .filter(|n| filter.map_or(true, |f| f.accepts(n)))
        .collect();

    // Stable: equal latencies keep the indexer's order
    candidates.sort_by_key(|n| n.latency_ms.unwrap_or(u64::MAX));
    candidates.truncate(replica_count);
    candidates
}

#[async_trait]
impl NodeSelector for IndexerClient {
    async fn select(
        &self,
        _ctx: &TransferContext,
        min_nodes: usize,
        replica_count: usize,
        filter: Option<&NodeFilter>,
    ) -> Result<Vec<NodeInfo>, ServiceError> {
        let advertised = self.list_nodes().await?;
        let advertised_count = advertised.len();
        let selected = rank_nodes(advertised, replica_count, filter);

        if selected.len() < min_nodes {
            debug!(
                advertised = advertised_count,
                selected = selected.len(),
                min_nodes,
                "Indexer returned fewer nodes than requested"
            );
        }

        debug!(
            endpoint = %self.rpc.url(),
            selected = ?selected.iter().map(|n| n.url.as_str()).collect::<Vec<_>>(),
            "Selected storage nodes"
        );

        Ok(selected)
    }
}
