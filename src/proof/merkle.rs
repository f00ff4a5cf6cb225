//! Merkle Tree Commitments
//!
//! Binary Merkle tree over commitment digests. A team publishes the root of
//! its setup tree once; every later rank reveal carries an inclusion proof
//! against that root.
//!
//! Shape rules:
//! - leaves are commitment digests used as-is (already domain separated)
//! - an unpaired last node at any level is paired with itself
//! - a one-leaf tree's root is the leaf
//! - an empty tree's root is [`empty_hash`]

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::hash::{Digest, StateHasher, hash_with_domain};

/// Domain separator for Merkle tree internal nodes.
const MERKLE_NODE_DOMAIN: &[u8] = b"STRATAGEM_MERKLE_NODE_V1";

/// Domain separator for the empty tree.
const MERKLE_EMPTY_DOMAIN: &[u8] = b"STRATAGEM_MERKLE_EMPTY_V1";

/// Root of a tree with no leaves.
pub fn empty_hash() -> Digest {
    hash_with_domain(MERKLE_EMPTY_DOMAIN, &[])
}

/// Merkle tree errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// Asked for a proof of a leaf that does not exist.
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of leaves
        len: usize,
    },
}

/// Binary Merkle tree with every level kept for proof generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// All tree levels (leaves at index 0, root at last index)
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over leaves in the given order.
    pub fn build(leaves: &[Digest]) -> Self {
        let mut levels = vec![leaves.to_vec()];

        let mut current_level = leaves.to_vec();
        while current_level.len() > 1 {
            let next_level: Vec<Digest> = current_level
                .chunks(2)
                .map(|chunk| {
                    let left = &chunk[0];
                    let right = chunk.get(1).unwrap_or(left);
                    hash_nodes(left, right)
                })
                .collect();
            levels.push(next_level.clone());
            current_level = next_level;
        }

        Self { levels }
    }

    /// Root hash.
    pub fn root(&self) -> Digest {
        match self.levels.last() {
            Some(top) if top.len() == 1 => top[0],
            _ => empty_hash(),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Leaf at an index.
    pub fn leaf(&self, index: usize) -> Option<&Digest> {
        self.levels.first()?.get(index)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut current_index = index;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = current_index ^ 1;
            let sibling = level.get(sibling_index).unwrap_or(&level[current_index]);
            siblings.push(*sibling);
            current_index /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            siblings,
        })
    }
}

/// Merkle inclusion proof.
///
/// Bit `i` of `leaf_index` says whether the running hash is the right child
/// at level `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf in the tree
    pub leaf_index: usize,
    /// Sibling hashes, leaf level first
    pub siblings: Vec<Digest>,
}

/// Check that `leaf` sits at `proof.leaf_index` under `root`.
pub fn verify(root: &Digest, leaf: &Digest, proof: &MerkleProof) -> bool {
    let depth = proof.siblings.len();
    if depth < usize::BITS as usize && proof.leaf_index >> depth != 0 {
        return false;
    }

    let mut current_hash = *leaf;
    for (level, sibling) in proof.siblings.iter().enumerate() {
        current_hash = if (proof.leaf_index >> level) & 1 == 0 {
            hash_nodes(&current_hash, sibling)
        } else {
            hash_nodes(sibling, &current_hash)
        };
    }

    current_hash == *root
}

/// Hash two child nodes with domain separation.
fn hash_nodes(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = StateHasher::new(MERKLE_NODE_DOMAIN);
    hasher.update_bytes(left);
    hasher.update_bytes(right);
    hasher.finalize()
}
