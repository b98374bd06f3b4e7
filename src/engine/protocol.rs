//! Storage node HTTP API
//!
//! - `PUT /file/{root}`                  announce a file (`FileInfo`)
//! - `GET /file/{root}`                  file metadata
//! - `PUT /file/{root}/segment/{index}`  store one segment with its proof
//! - `GET /file/{root}/segment/{index}`  fetch one segment with its proof

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::merkle::{leaf_hash, MerkleProof};
use crate::types::ContentRoot;

/// File metadata held by every replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub root: ContentRoot,
    pub size: u64,
    pub chunk_size: u64,
    pub chunk_count: u64,
}

/// One segment and its inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub proof: MerkleProof,
}

impl Segment {
    /// Check this segment is leaf `index` of a `leaf_count`-leaf tree rooted at `root`
    pub fn verify(&self, root: &ContentRoot, index: u64, leaf_count: u64) -> Result<(), String> {
        if self.index != index || self.proof.index != index {
            return Err(format!(
                "segment {} answered with index {} (proof index {})",
                index, self.index, self.proof.index
            ));
        }
        if self.proof.leaf_count != leaf_count {
            return Err(format!(
                "segment {} proof covers {} leaves, file has {}",
                index, self.proof.leaf_count, leaf_count
            ));
        }
        if !self.proof.verify(&leaf_hash(&self.data), root) {
            return Err(format!("segment {} does not verify against {}", index, root));
        }
        Ok(())
    }
}

pub fn file_url(base: &str, root: &ContentRoot) -> String {
    format!("{}/file/{}", base.trim_end_matches('/'), root)
}

pub fn segment_url(base: &str, root: &ContentRoot, index: u64) -> String {
    format!("{}/segment/{}", file_url(base, root), index)
}

/// Turn non-2xx responses into errors
pub(crate) async fn check_status(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ServiceError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Protocol(format!(
            "{} returned HTTP {}: {}",
            url,
            status.as_u16(),
            body
        )));
    }
    Ok(response)
}

mod base64_bytes {
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::MerkleTree;

    fn two_segment_file() -> (MerkleTree, Vec<Segment>) {
        let parts: [&[u8]; 2] = [b"hello ", b"world"];
        let tree = MerkleTree::from_segments(parts);
        let segments = parts
            .iter()
            .enumerate()
            .map(|(i, p)| Segment {
                index: i as u64,
                data: p.to_vec(),
                proof: tree.proof(i).unwrap(),
            })
            .collect();
        (tree, segments)
    }

    #[test]
    fn test_urls() {
        let root = ContentRoot::from_bytes([0xaa; 32]);
        assert_eq!(
            file_url("http://node:5678/", &root),
            format!("http://node:5678/file/0x{}", "aa".repeat(32))
        );
        assert!(segment_url("http://node:5678", &root, 4).ends_with("/segment/4"));
    }

    #[test]
    fn test_segment_verify() {
        let (tree, segments) = two_segment_file();
        let root = tree.root();
        assert!(segments[0].verify(&root, 0, 2).is_ok());
        assert!(segments[1].verify(&root, 1, 2).is_ok());

        // Served for the wrong index
        assert!(segments[0].verify(&root, 1, 2).is_err());

        // Corrupted bytes
        let mut bad = segments[1].clone();
        bad.data[0] ^= 0xff;
        assert!(bad.verify(&root, 1, 2).is_err());
    }

    #[test]
    fn test_segment_json_uses_base64() {
        let (_, segments) = two_segment_file();
        let json = serde_json::to_value(&segments[0]).unwrap();
        assert_eq!(json["data"], "aGVsbG8g");
        let back: Segment = serde_json::from_value(json).unwrap();
        assert_eq!(back, segments[0]);
    }
}
