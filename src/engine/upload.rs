//! Upload session: replicate every segment to every selected node

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{header, Client};
use tracing::{debug, info};

use super::protocol::{check_status, file_url, segment_url, FileInfo, Segment};
use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::merkle::{self, MerkleTree};
use crate::traits::{ChainBinding, UploadSession};
use crate::types::{ContentRoot, EndpointSet, PushReceipt, TxRef};

pub struct HttpUploadSession {
    client: Client,
    chain: Arc<dyn ChainBinding>,
    endpoints: EndpointSet,
    chunk_size: usize,
    /// Root of the last completed push; commit is refused for anything else
    pushed: Option<ContentRoot>,
}

impl HttpUploadSession {
    pub(crate) fn new(
        client: Client,
        chain: Arc<dyn ChainBinding>,
        endpoints: EndpointSet,
        chunk_size: usize,
    ) -> Self {
        Self {
            client,
            chain,
            endpoints,
            chunk_size,
            pushed: None,
        }
    }

    async fn put_json<T: serde::Serialize>(&self, url: &str, body: &T) -> Result<(), ServiceError> {
        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("{}: {}", url, e)))?;
        check_status(response, url).await?;
        Ok(())
    }

    /// Store the file announcement and every segment on one node
    async fn replicate(
        &self,
        base: &str,
        info: &FileInfo,
        segments: &[&[u8]],
        tree: &MerkleTree,
    ) -> Result<(), ServiceError> {
        self.put_json(&file_url(base, &info.root), info).await?;

        for (i, data) in segments.iter().enumerate() {
            let proof = tree
                .proof(i)
                .ok_or_else(|| ServiceError::Protocol(format!("no proof for segment {}", i)))?;
            let segment = Segment {
                index: i as u64,
                data: data.to_vec(),
                proof,
            };
            self.put_json(&segment_url(base, &info.root, i as u64), &segment)
                .await?;
        }

        debug!(node = %base, root = %info.root, segments = segments.len(), "Replica stored");
        Ok(())
    }
}

#[async_trait]
impl UploadSession for HttpUploadSession {
    async fn push(
        &mut self,
        _ctx: &TransferContext,
        path: &Path,
    ) -> Result<PushReceipt, ServiceError> {
        let data = tokio::fs::read(path).await?;
        let segments = merkle::segments(&data, self.chunk_size);
        let tree = MerkleTree::from_segments(segments.iter().copied());

        let info = FileInfo {
            root: tree.root(),
            size: data.len() as u64,
            chunk_size: self.chunk_size as u64,
            chunk_count: tree.leaf_count(),
        };

        info!(
            root = %info.root,
            size = info.size,
            segments = info.chunk_count,
            replicas = self.endpoints.len(),
            "Pushing file"
        );

        // Every node must take the whole file; one failure fails the push
        let replicas = self
            .endpoints
            .iter()
            .map(|node| self.replicate(&node.url, &info, &segments, &tree));
        try_join_all(replicas).await?;

        self.pushed = Some(info.root);

        Ok(PushReceipt {
            root: info.root,
            size: info.size,
            chunk_count: info.chunk_count,
            replicas: self.endpoints.len(),
        })
    }

    async fn commit(
        &mut self,
        ctx: &TransferContext,
        receipt: &PushReceipt,
    ) -> Result<TxRef, ServiceError> {
        if self.pushed != Some(receipt.root) {
            return Err(ServiceError::Protocol(format!(
                "refusing to commit {}: not pushed by this session",
                receipt.root
            )));
        }
        self.chain.submit_commitment(ctx, &receipt.commitment()).await
    }
}
