//! Merkle tree over audit leaf hashes.
//!
//! Leaves are SHA-256 digests of canonicalized event content. Nodes are
//! domain-separated: leaf nodes hash with a `0x00` prefix, interior
//! nodes with `0x01`, so a leaf can never be reinterpreted as an
//! interior node. An unpaired node at the end of a level is paired with
//! itself, in root computation and proof construction alike.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub(crate) type NodeDigest = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub(crate) fn leaf_node(leaf: &NodeDigest) -> NodeDigest {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf);
    hasher.finalize().into()
}

pub(crate) fn inner_node(left: &NodeDigest, right: &NodeDigest) -> NodeDigest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn parent_level(level: &[NodeDigest]) -> Vec<NodeDigest> {
    level
        .chunks(2)
        .map(|pair| {
            // Unpaired trailing node is hashed with itself
            let right = pair.get(1).unwrap_or(&pair[0]);
            inner_node(&pair[0], right)
        })
        .collect()
}

pub(crate) fn decode_digest(raw: &str) -> Option<NodeDigest> {
    let bytes = hex::decode(raw).ok()?;
    bytes.try_into().ok()
}

/// Which side of the current node the sibling digest sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One level of an inclusion proof: a sibling digest and its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Inclusion proof for one audit event. Verifiable with nothing but a
/// trusted root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProof {
    pub sequence_index: u64,
    pub leaf_hash: String,
    pub path: Vec<ProofStep>,
    pub root: String,
}

/// Ordered leaf sequence with Merkle commitments.
///
/// Leaf order is append order; leaves are never removed or reordered.
#[derive(Debug, Default, Clone)]
pub(crate) struct MerkleTree {
    leaves: Vec<NodeDigest>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    pub fn from_leaves(leaves: Vec<NodeDigest>) -> Self {
        Self { leaves }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn push(&mut self, leaf: NodeDigest) {
        self.leaves.push(leaf);
    }

    /// Root over the current leaves, `None` while empty. A single-leaf
    /// tree's root is that leaf's wrapped node.
    pub fn root(&self) -> Option<NodeDigest> {
        if self.leaves.is_empty() {
            return None;
        }
        Some(Self::reduce(self.wrapped_leaves()))
    }

    /// Root as if `leaf` were appended, without mutating the tree.
    pub fn root_with(&self, leaf: &NodeDigest) -> NodeDigest {
        let mut wrapped = self.wrapped_leaves();
        wrapped.push(leaf_node(leaf));
        Self::reduce(wrapped)
    }

    /// Inclusion proof for the leaf at `index` against the current root.
    pub fn prove(&self, index: usize) -> Option<AuditProof> {
        if index >= self.leaves.len() {
            return None;
        }
        let mut path = Vec::new();
        let mut level = self.wrapped_leaves();
        let mut idx = index;
        while level.len() > 1 {
            let step = if idx % 2 == 0 {
                // Self-paired when no right sibling exists
                let sibling = level.get(idx + 1).copied().unwrap_or(level[idx]);
                ProofStep {
                    sibling: hex::encode(sibling),
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling: hex::encode(level[idx - 1]),
                    side: Side::Left,
                }
            };
            path.push(step);
            level = parent_level(&level);
            idx /= 2;
        }
        Some(AuditProof {
            sequence_index: index as u64,
            leaf_hash: hex::encode(self.leaves[index]),
            path,
            root: hex::encode(level[0]),
        })
    }

    fn wrapped_leaves(&self) -> Vec<NodeDigest> {
        self.leaves.iter().map(leaf_node).collect()
    }

    fn reduce(mut level: Vec<NodeDigest>) -> NodeDigest {
        while level.len() > 1 {
            level = parent_level(&level);
        }
        level[0]
    }
}

/// Check `proof` against a trusted root. Recomputes the hash chain from
/// the leaf up; any altered byte in the proof makes this fail.
pub fn verify(proof: &AuditProof, expected_root: &str) -> bool {
    let leaf = match decode_digest(&proof.leaf_hash) {
        Some(digest) => digest,
        None => return false,
    };
    let mut current = leaf_node(&leaf);
    for step in &proof.path {
        let sibling = match decode_digest(&step.sibling) {
            Some(digest) => digest,
            None => return false,
        };
        current = match step.side {
            Side::Left => inner_node(&sibling, &current),
            Side::Right => inner_node(&current, &sibling),
        };
    }
    let derived = hex::encode(current);
    derived == proof.root && derived == expected_root
}
