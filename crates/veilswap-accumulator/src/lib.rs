//! veilswap accumulator
//!
//! one append-only commitment tree per pool id, persisted on every
//! insert. inserts serialize on a per-pool lock; path queries read a
//! consistent snapshot under the same lock and never mutate

pub mod error;
pub mod store;
pub mod tree;

pub use error::{Result, TreeError};
pub use store::Accumulator;
pub use tree::{Insertion, MerklePath, PoolTree};

/// fixed depth of every pool tree
pub const TREE_DEPTH: usize = 32;
/// bounded root history per pool; older roots become unprovable
pub const ROOT_HISTORY_SIZE: usize = 32;
