//! per-pool append-only commitment tree
//!
//! appending walks the leaf index through the cached left siblings, so an
//! insert is O(depth) instead of a full rehash. authentication paths are
//! rebuilt level-by-level from the complete leaf set, zero-padding the
//! frontier, which yields exactly the roots the incremental walk produced

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use veilswap_core::{hash_pair, FieldElement};

use crate::error::{Result, TreeError};
use crate::{ROOT_HISTORY_SIZE, TREE_DEPTH};

/// result of one insertion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Insertion {
    pub index: u64,
    pub new_root: FieldElement,
}

/// merkle authentication path for one leaf
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerklePath {
    /// sibling hashes, leaf level first
    pub siblings: Vec<FieldElement>,
    /// 0 = leaf is the left child at that level, 1 = right
    pub path_indices: Vec<u8>,
    /// latest root of the queried tree
    pub root: FieldElement,
}

impl MerklePath {
    /// recompute the root from `leaf` by pairwise hashing
    pub fn reconstruct_root(&self, leaf: &FieldElement) -> Result<FieldElement> {
        let mut current = *leaf;
        for (sibling, side) in self.siblings.iter().zip(&self.path_indices) {
            current = if *side == 0 {
                hash_pair(&current, sibling)?
            } else {
                hash_pair(sibling, &current)?
            };
        }
        Ok(current)
    }
}

/// one pool's tree state; doubles as the persisted record layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolTree {
    pub depth: usize,
    pub next_index: u64,
    pub leaves: Vec<FieldElement>,
    /// cached left sibling per level
    pub filled_subtrees: Vec<FieldElement>,
    /// bounded ring of recent roots; the back is always the current root
    pub roots: VecDeque<FieldElement>,
}

impl Default for PoolTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolTree {
    /// empty tree: zero filled subtrees, root zero
    pub fn new() -> Self {
        let mut roots = VecDeque::with_capacity(ROOT_HISTORY_SIZE + 1);
        roots.push_back(FieldElement::zero());
        Self {
            depth: TREE_DEPTH,
            next_index: 0,
            leaves: Vec::new(),
            filled_subtrees: vec![FieldElement::zero(); TREE_DEPTH],
            roots,
        }
    }

    pub fn current_root(&self) -> FieldElement {
        self.roots.back().copied().unwrap_or_else(FieldElement::zero)
    }

    /// whether `root` is in the bounded history; the zero root is never known
    pub fn is_known_root(&self, root: &FieldElement) -> bool {
        if root.is_zero() {
            return false;
        }
        self.roots.contains(root)
    }

    /// append a commitment, returning its index and the new root
    pub fn insert(&mut self, commitment: FieldElement) -> Result<Insertion> {
        if self.next_index >= 1u64 << self.depth {
            return Err(TreeError::TreeFull(self.next_index));
        }

        // walk on a scratch copy so a hash failure leaves the tree untouched
        let mut subtrees = self.filled_subtrees.clone();
        let mut node = commitment;
        let mut position = self.next_index;
        for level in 0..self.depth {
            if position % 2 == 0 {
                subtrees[level] = node;
                node = hash_pair(&node, &FieldElement::zero())?;
            } else {
                node = hash_pair(&subtrees[level], &node)?;
            }
            position /= 2;
        }

        let index = self.next_index;
        self.filled_subtrees = subtrees;
        self.leaves.push(commitment);
        self.next_index += 1;
        self.roots.push_back(node);
        if self.roots.len() > ROOT_HISTORY_SIZE {
            self.roots.pop_front();
        }

        Ok(Insertion {
            index,
            new_root: node,
        })
    }

    /// authentication path for leaf `index` against the current leaf set
    pub fn path(&self, index: u64) -> Result<MerklePath> {
        if index >= self.next_index {
            return Err(TreeError::IndexOutOfRange {
                index,
                next_index: self.next_index,
            });
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut level: Vec<FieldElement> = self.leaves.clone();
        let mut position = index as usize;

        for _ in 0..self.depth {
            if level.len() % 2 == 1 {
                level.push(FieldElement::zero());
            }

            let sibling = if position % 2 == 0 {
                level[position + 1]
            } else {
                level[position - 1]
            };
            siblings.push(sibling);
            path_indices.push((position % 2) as u8);

            let mut next = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                next.push(hash_pair(&pair[0], &pair[1])?);
            }
            level = next;
            position /= 2;
        }

        Ok(MerklePath {
            siblings,
            path_indices,
            root: self.current_root(),
        })
    }
}
