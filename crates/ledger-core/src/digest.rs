//! Incremental binary Merkle digests over fixed leaf arrays
//!
//! A `DigestTree` keeps every node of a complete binary tree over `2^depth`
//! leaves in one flat array, laid out level by level: the leaves first, then
//! their parents, and so on up to the root, which is the last element.
//!
//! ## Change tracking
//!
//! A single leaf-sized bitmap tracks which nodes need rehashing. Recompute
//! walks the levels bottom-up; whenever either child of a pair is flagged,
//! the parent is rehashed, both child bits are cleared and bit `i >> 1` is
//! set so the next level picks it up. Pairs are always visited in increasing
//! index order and internal nodes always hash exactly two 32-byte digests.
//!
//! A fresh tree has every bit set, so the first recompute covers every leaf.

use crate::errors::{LedgerError, Result};
use crate::hash::{hash_pair, Digest, ZERO_DIGEST};
use serde::{Deserialize, Serialize};

/// Deepest tree supported (2^32 leaves)
pub const MAX_DIGEST_DEPTH: u32 = 32;

/// Supplies leaf digests to a `DigestTree`.
///
/// Tables implement this by hashing the canonical bytes of the record at
/// `index`; sources with absent leaves may return `ZERO_DIGEST`.
pub trait LeafSource {
    /// Digest of the leaf at `index`
    fn leaf_digest(&self, index: usize) -> Digest;
}

/// Incrementally maintained Merkle digest
#[derive(Debug, Clone)]
pub struct DigestTree {
    depth: u32,
    leaf_count: usize,
    nodes: Vec<Digest>,
    dirty: Vec<u64>,
}

impl DigestTree {
    /// Create a tree over `2^depth` leaves with every leaf flagged.
    pub fn new(depth: u32) -> Result<Self> {
        if depth > MAX_DIGEST_DEPTH {
            return Err(LedgerError::invalid(format!(
                "digest depth {depth} exceeds {MAX_DIGEST_DEPTH}"
            )));
        }
        let leaf_count = 1usize << depth;
        let mut tree = Self {
            depth,
            leaf_count,
            nodes: vec![ZERO_DIGEST; leaf_count * 2 - 1],
            dirty: vec![0u64; leaf_count.div_ceil(64)],
        };
        tree.mark_all_dirty();
        Ok(tree)
    }

    /// Tree depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Flag a leaf for rehashing on the next recompute.
    pub fn mark_dirty(&mut self, index: usize) {
        self.dirty[index >> 6] |= 1u64 << (index & 63);
    }

    /// Flag every leaf.
    pub fn mark_all_dirty(&mut self) {
        for word in &mut self.dirty {
            *word = u64::MAX;
        }
        let tail = self.leaf_count & 63;
        if tail != 0 {
            if let Some(last) = self.dirty.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
    }

    /// Whether a leaf is flagged
    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty[index >> 6] & (1u64 << (index & 63)) != 0
    }

    /// Whether any leaf is flagged
    pub fn has_pending_changes(&self) -> bool {
        self.dirty.iter().any(|w| *w != 0)
    }

    fn clear_bit(&mut self, index: usize) {
        self.dirty[index >> 6] &= !(1u64 << (index & 63));
    }

    /// Rehash flagged leaves and every ancestor of a flagged leaf.
    ///
    /// Returns the new root. Calling it again without new flags is a no-op.
    pub fn recompute(&mut self, source: &impl LeafSource) -> Digest {
        for word_index in 0..self.dirty.len() {
            let mut word = self.dirty[word_index];
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                let leaf = (word_index << 6) | bit;
                self.nodes[leaf] = source.leaf_digest(leaf);
                word &= word - 1;
            }
        }

        let mut level_start = 0usize;
        let mut width = self.leaf_count;
        while width > 1 {
            let parent_start = level_start + width;
            for i in (0..width).step_by(2) {
                if self.is_dirty(i) || self.is_dirty(i + 1) {
                    self.nodes[parent_start + (i >> 1)] =
                        hash_pair(&self.nodes[level_start + i], &self.nodes[level_start + i + 1]);
                    self.clear_bit(i);
                    self.clear_bit(i + 1);
                    self.mark_dirty(i >> 1);
                }
            }
            level_start = parent_start;
            width >>= 1;
        }
        self.clear_bit(0);

        self.root()
    }

    /// Rehash every leaf and node unconditionally.
    pub fn rebuild(&mut self, source: &impl LeafSource) -> Digest {
        self.mark_all_dirty();
        self.recompute(source)
    }

    /// Current root digest
    pub fn root(&self) -> Digest {
        self.nodes[self.nodes.len() - 1]
    }

    /// Current digest of a leaf
    pub fn leaf(&self, index: usize) -> Digest {
        self.nodes[index]
    }

    /// Sibling digests from the leaf level up to just below the root.
    pub fn siblings(&self, index: usize) -> Vec<Digest> {
        let mut out = Vec::with_capacity(self.depth as usize);
        let mut i = index;
        let mut level_start = 0usize;
        let mut width = self.leaf_count;
        while width > 1 {
            out.push(self.nodes[level_start + (i ^ 1)]);
            level_start += width;
            width >>= 1;
            i >>= 1;
        }
        out
    }

    /// Inclusion proof for a leaf
    pub fn proof(&self, index: usize) -> InclusionProof {
        InclusionProof {
            leaf_index: index as u64,
            siblings: self.siblings(index),
        }
    }
}

/// Sibling path proving a leaf digest is part of a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Index of the proven leaf
    pub leaf_index: u64,
    /// Sibling digests, leaf level first
    pub siblings: Vec<Digest>,
}

impl InclusionProof {
    /// Check structural invariants after decoding.
    pub fn validate(&self) -> Result<()> {
        if self.siblings.len() > MAX_DIGEST_DEPTH as usize {
            return Err(LedgerError::invalid(format!(
                "sibling path length {} exceeds maximum depth {MAX_DIGEST_DEPTH}",
                self.siblings.len()
            )));
        }
        if self.siblings.len() < 64 && self.leaf_index >> self.siblings.len() != 0 {
            return Err(LedgerError::invalid(format!(
                "leaf index {} out of bounds for depth {}",
                self.leaf_index,
                self.siblings.len()
            )));
        }
        Ok(())
    }

    /// Root obtained by folding the sibling path over `leaf`
    pub fn fold(&self, leaf: &Digest) -> Digest {
        let mut acc = *leaf;
        let mut index = self.leaf_index;
        for sibling in &self.siblings {
            acc = if index & 1 == 0 {
                hash_pair(&acc, sibling)
            } else {
                hash_pair(sibling, &acc)
            };
            index >>= 1;
        }
        acc
    }

    /// Whether `leaf` at this proof's index is committed to by `root`
    pub fn verify(&self, root: &Digest, leaf: &Digest) -> bool {
        self.validate().is_ok() && self.fold(leaf) == *root
    }
}
