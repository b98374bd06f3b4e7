//! Merkle tree over file segments
//!
//! Leaves are `sha256(0x00 || segment)`, inner nodes `sha256(0x01 || left || right)`.
//! An odd node at the end of a level is promoted unchanged. The tree root is the
//! file's content root.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::types::{ContentRoot, ROOT_LEN};

pub type Digest = [u8; ROOT_LEN];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub fn leaf_hash(segment: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(segment);
    hasher.finalize().into()
}

fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Split content into segments of `chunk_size` bytes.
///
/// Empty content is a single empty segment so every file has a root.
pub fn segments(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(chunk_size.max(1)).collect()
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds the root
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    pub fn from_segments<'a, I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        Self::from_leaves(segments.into_iter().map(leaf_hash).collect())
    }

    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        let leaves = if leaves.is_empty() {
            vec![leaf_hash(&[])]
        } else {
            leaves
        };

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<Digest> = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => node_hash(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    pub fn root(&self) -> ContentRoot {
        ContentRoot::from_bytes(self.levels[self.levels.len() - 1][0])
    }

    pub fn leaf_count(&self) -> u64 {
        self.levels[0].len() as u64
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.levels[0].len() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if idx % 2 == 1 {
                siblings.push(level[idx - 1]);
            } else if idx + 1 < level.len() {
                siblings.push(level[idx + 1]);
            }
            idx /= 2;
        }

        Some(MerkleProof {
            index: index as u64,
            leaf_count: self.leaf_count(),
            siblings,
        })
    }
}

/// Inclusion proof for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub index: u64,
    pub leaf_count: u64,
    #[serde(with = "hex_digests")]
    pub siblings: Vec<Digest>,
}

impl MerkleProof {
    /// Check that `leaf` sits at `self.index` in a tree of `self.leaf_count`
    /// leaves with the given root.
    ///
    /// Sibling sides are derived from the index, never from the proof data.
    pub fn verify(&self, leaf: &Digest, root: &ContentRoot) -> bool {
        if self.leaf_count == 0 || self.index >= self.leaf_count {
            return false;
        }

        let mut acc = *leaf;
        let mut idx = self.index;
        let mut width = self.leaf_count;
        let mut siblings = self.siblings.iter();

        while width > 1 {
            if idx % 2 == 1 {
                match siblings.next() {
                    Some(left) => acc = node_hash(left, &acc),
                    None => return false,
                }
            } else if idx + 1 < width {
                match siblings.next() {
                    Some(right) => acc = node_hash(&acc, right),
                    None => return false,
                }
            }
            idx /= 2;
            width = (width + 1) / 2;
        }

        siblings.next().is_none() && &acc == root.as_bytes()
    }
}

mod hex_digests {
    use super::Digest;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digests: &[Digest], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(digests.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Digest>, D::Error> {
        let encoded: Vec<String> = Vec::deserialize(d)?;
        encoded
            .iter()
            .map(|h| {
                let bytes = hex::decode(h).map_err(D::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| D::Error::custom("digest must be 32 bytes"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(n: usize) -> (Vec<Vec<u8>>, MerkleTree) {
        let segs: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8; 10]).collect();
        let tree = MerkleTree::from_segments(segs.iter().map(|s| s.as_slice()));
        (segs, tree)
    }

    #[test]
    fn test_single_segment_root_is_leaf() {
        let tree = MerkleTree::from_segments(segments(b"0123456789", 1024));
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.root().as_bytes(), &leaf_hash(b"0123456789"));
    }

    #[test]
    fn test_empty_content_has_root() {
        let tree = MerkleTree::from_segments(segments(b"", 1024));
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.root().as_bytes(), &leaf_hash(b""));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in [1, 2, 3, 5, 8, 13] {
            let (segs, tree) = tree_of(n);
            let root = tree.root();
            for (i, seg) in segs.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&leaf_hash(seg), &root), "n={} i={}", n, i);
            }
            assert!(tree.proof(n).is_none());
        }
    }

    #[test]
    fn test_proof_rejects_wrong_data_or_position() {
        let (segs, tree) = tree_of(5);
        let root = tree.root();

        let proof = tree.proof(2).unwrap();
        assert!(!proof.verify(&leaf_hash(b"tampered"), &root));

        // Same bytes claimed at another index
        let mut moved = proof.clone();
        moved.index = 3;
        assert!(!moved.verify(&leaf_hash(&segs[2]), &root));

        // Lying about the tree shape
        let mut reshaped = proof.clone();
        reshaped.leaf_count = 4;
        assert!(!reshaped.verify(&leaf_hash(&segs[2]), &root));

        // Wrong root
        let other = ContentRoot::from_bytes([9u8; 32]);
        assert!(!proof.verify(&leaf_hash(&segs[2]), &other));
    }

    #[test]
    fn test_root_depends_on_order() {
        let a = MerkleTree::from_segments([b"one".as_slice(), b"two".as_slice()]);
        let b = MerkleTree::from_segments([b"two".as_slice(), b"one".as_slice()]);
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_proof_json_shape() {
        let (_, tree) = tree_of(2);
        let proof = tree.proof(0).unwrap();
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["leafCount"], 2);
        assert_eq!(json["siblings"].as_array().unwrap().len(), 1);

        let back: MerkleProof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
