//! Download session: fetch segments with per-node fallback and verify proofs
//!
//! Bytes are staged in `<output>.partial` and renamed onto the output path
//! only after every segment has arrived (and verified, when asked to).

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::protocol::{check_status, file_url, segment_url, FileInfo, Segment};
use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::traits::{partial_path, DownloadSession};
use crate::types::{ContentRoot, EndpointSet};

pub struct HttpDownloadSession {
    client: Client,
    endpoints: EndpointSet,
}

impl HttpDownloadSession {
    pub(crate) fn new(client: Client, endpoints: EndpointSet) -> Self {
        Self { client, endpoints }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("{}: {}", url, e)))?;
        let response = check_status(response, url).await?;
        Ok(response.json().await?)
    }

    /// File metadata from the first node whose answer `accept` agrees with.
    ///
    /// A node with stale or wrong metadata counts as a failed node; the next
    /// one is asked.
    async fn fetch_info<F>(&self, root: &ContentRoot, accept: F) -> Result<FileInfo, ServiceError>
    where
        F: Fn(&FileInfo) -> Result<(), String> + Sync,
    {
        let mut last_error = None;
        let mut integrity_failure = None;

        for node in self.endpoints.iter() {
            let info = match self.get_json::<FileInfo>(&file_url(&node.url, root)).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(node = %node.url, root = %root, error = %e, "File info unavailable, trying next node");
                    last_error = Some(e);
                    continue;
                }
            };

            if let Err(reason) = accept(&info) {
                warn!(node = %node.url, root = %root, reason = %reason, "File info rejected, trying next node");
                integrity_failure = Some(reason);
                continue;
            }

            return Ok(info);
        }

        if let Some(reason) = integrity_failure {
            return Err(ServiceError::Integrity(reason));
        }
        Err(last_error.unwrap_or_else(|| ServiceError::NotFound(root.to_string())))
    }

    /// Fetch one segment, falling back through the endpoints in preference order.
    ///
    /// With `leaf_count` unset the proof is checked against its own leaf
    /// count.
    async fn fetch_segment_with_fallback(
        &self,
        root: &ContentRoot,
        index: u64,
        leaf_count: Option<u64>,
        verify: bool,
    ) -> Result<Segment, ServiceError> {
        let mut last_error = None;
        let mut integrity_failure = None;

        for node in self.endpoints.iter() {
            let url = segment_url(&node.url, root, index);
            let segment = match self.get_json::<Segment>(&url).await {
                Ok(segment) => segment,
                Err(e) => {
                    warn!(node = %node.url, index, error = %e, "Failed to fetch segment, trying next node");
                    last_error = Some(e);
                    continue;
                }
            };

            if verify {
                let expected = leaf_count.unwrap_or(segment.proof.leaf_count);
                if let Err(reason) = segment.verify(root, index, expected) {
                    warn!(node = %node.url, index, reason = %reason, "Segment failed verification, trying next node");
                    integrity_failure = Some(reason);
                    continue;
                }
            }

            return Ok(segment);
        }

        // Bad bytes outrank missing bytes: callers must learn the data is corrupt
        if let Some(reason) = integrity_failure {
            return Err(ServiceError::Integrity(reason));
        }
        Err(last_error.unwrap_or_else(|| {
            ServiceError::Network(format!("no node served segment {} of {}", index, root))
        }))
    }

    /// Write `first` and the remaining segments to `staging`, returning the byte count
    async fn fetch_into(
        &self,
        staging: &Path,
        root: &ContentRoot,
        first: Segment,
        leaf_count: u64,
        verify: bool,
    ) -> Result<u64, ServiceError> {
        let mut file = fs::File::create(staging).await?;
        file.write_all(&first.data).await?;
        let mut written = first.data.len() as u64;

        for index in 1..leaf_count {
            let segment = self
                .fetch_segment_with_fallback(root, index, Some(leaf_count), verify)
                .await?;
            file.write_all(&segment.data).await?;
            written += segment.data.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn stage(
        &self,
        staging: &Path,
        root: &ContentRoot,
        verify: bool,
    ) -> Result<u64, ServiceError> {
        // Segment 0 first: the leaf count of its verified proof is what every
        // node's metadata is checked against, and later proofs must agree with it
        let first = self.fetch_segment_with_fallback(root, 0, None, verify).await?;
        let leaf_count = first.proof.leaf_count;

        let info = self
            .fetch_info(root, |info| {
                if verify {
                    check_info(info, root, leaf_count)
                } else {
                    Ok(())
                }
            })
            .await?;

        let leaf_count = if verify { leaf_count } else { info.chunk_count };
        if leaf_count == 0 {
            return Err(ServiceError::Protocol(format!("{} has no segments", root)));
        }

        debug!(root = %root, size = info.size, segments = leaf_count, "Fetching file");

        let written = self.fetch_into(staging, root, first, leaf_count, verify).await?;

        if verify && written != info.size {
            // The metadata node may be the wrong one; another node must vouch
            // for the verified length
            self.fetch_info(root, |other| {
                check_info(other, root, leaf_count)?;
                if other.size != written {
                    return Err(format!(
                        "received {} verified bytes, file info claims {}",
                        written, other.size
                    ));
                }
                Ok(())
            })
            .await?;
        }

        Ok(written)
    }
}

/// Metadata must describe `root` and agree with the authenticated leaf count
pub(crate) fn check_info(info: &FileInfo, root: &ContentRoot, leaf_count: u64) -> Result<(), String> {
    if info.root != *root {
        return Err(format!("node describes {} when asked for {}", info.root, root));
    }
    if info.chunk_count != leaf_count {
        return Err(format!(
            "file info claims {} segments, proofs show {}",
            info.chunk_count, leaf_count
        ));
    }
    if info.chunk_size == 0 {
        return Err("file info has zero chunk size".to_string());
    }
    let expected = if info.size == 0 {
        1
    } else {
        (info.size + info.chunk_size - 1) / info.chunk_size
    };
    if expected != info.chunk_count {
        return Err(format!(
            "{} bytes in {}-byte segments is {} segments, file info claims {}",
            info.size, info.chunk_size, expected, info.chunk_count
        ));
    }
    Ok(())
}

#[async_trait]
impl DownloadSession for HttpDownloadSession {
    async fn pull(
        &mut self,
        _ctx: &TransferContext,
        root: &ContentRoot,
        output: &Path,
        verify: bool,
    ) -> Result<(), ServiceError> {
        let staging = partial_path(output);
        let size = match self.stage(&staging, root, verify).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        fs::rename(&staging, output).await?;

        info!(root = %root, output = %output.display(), size, "File downloaded");
        Ok(())
    }
}
