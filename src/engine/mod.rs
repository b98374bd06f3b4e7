//! HTTP transfer engine
//!
//! Splits files into fixed-size segments, builds a Merkle tree over them and
//! stores every segment (with its inclusion proof) on every selected node.
//! Downloads fetch segments with per-node fallback and check each proof
//! against the requested content root.

pub mod download;
pub mod protocol;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::config::TransferConfig;
use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::traits::{ChainBinding, DownloadSession, TransferEngine, UploadSession};
use crate::types::EndpointSet;

pub use download::HttpDownloadSession;
pub use protocol::{FileInfo, Segment};
pub use upload::HttpUploadSession;

pub struct HttpTransferEngine {
    client: Client,
    chunk_size: usize,
}

impl HttpTransferEngine {
    pub fn new(config: &TransferConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn check_endpoints(endpoints: &EndpointSet) -> Result<(), ServiceError> {
        for node in endpoints.iter() {
            let url = Url::parse(&node.url).map_err(|e| {
                ServiceError::Protocol(format!("invalid node URL {:?}: {}", node.url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ServiceError::Protocol(format!(
                    "unsupported node URL scheme {:?}",
                    node.url
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn open_uploader(
        &self,
        _ctx: &TransferContext,
        chain: Arc<dyn ChainBinding>,
        endpoints: &EndpointSet,
    ) -> Result<Box<dyn UploadSession>, ServiceError> {
        Self::check_endpoints(endpoints)?;
        Ok(Box::new(HttpUploadSession::new(
            self.client.clone(),
            chain,
            endpoints.clone(),
            self.chunk_size,
        )))
    }

    async fn open_downloader(
        &self,
        endpoints: &EndpointSet,
    ) -> Result<Box<dyn DownloadSession>, ServiceError> {
        Self::check_endpoints(endpoints)?;
        Ok(Box::new(HttpDownloadSession::new(
            self.client.clone(),
            endpoints.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeInfo;

    #[test]
    fn test_check_endpoints() {
        let good = EndpointSet::new(vec![NodeInfo::new("http://127.0.0.1:5678")]).unwrap();
        assert!(HttpTransferEngine::check_endpoints(&good).is_ok());

        let bad = EndpointSet::new(vec![NodeInfo::new("not a url")]).unwrap();
        assert!(HttpTransferEngine::check_endpoints(&bad).is_err());

        let ftp = EndpointSet::new(vec![NodeInfo::new("ftp://node")]).unwrap();
        assert!(HttpTransferEngine::check_endpoints(&ftp).is_err());
    }
}
