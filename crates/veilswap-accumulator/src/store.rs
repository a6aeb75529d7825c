//! persisted accumulator store
//!
//! one sled record per pool id, read-modify-written on every insert. each
//! pool has its own mutex: inserts on the same pool serialize, different
//! pools do not contend, and path queries snapshot under the same lock so
//! they never observe a torn tree

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};
use veilswap_core::FieldElement;

use crate::error::{Result, TreeError};
use crate::tree::{Insertion, MerklePath, PoolTree};

pub struct Accumulator {
    db: sled::Db,
    pools: RwLock<HashMap<String, Arc<Mutex<PoolTree>>>>,
}

impl Accumulator {
    /// open the store, restoring every persisted pool
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        info!("opening accumulator store at {}", path.as_ref().display());
        let db = sled::open(path)?;
        let mut pools = HashMap::new();
        for entry in db.iter() {
            let (key, value) = entry?;
            let pool_id = String::from_utf8_lossy(&key).into_owned();
            let tree: PoolTree = bincode::deserialize(&value)?;
            debug!("restored pool {} ({} leaves)", pool_id, tree.next_index);
            pools.insert(pool_id, Arc::new(Mutex::new(tree)));
        }
        Ok(Self {
            db,
            pools: RwLock::new(pools),
        })
    }

    fn pool(&self, pool_id: &str) -> Result<Option<Arc<Mutex<PoolTree>>>> {
        let pools = self
            .pools
            .read()
            .map_err(|_| TreeError::Storage("pool map lock poisoned".into()))?;
        Ok(pools.get(pool_id).cloned())
    }

    fn pool_or_create(&self, pool_id: &str) -> Result<Arc<Mutex<PoolTree>>> {
        if let Some(existing) = self.pool(pool_id)? {
            return Ok(existing);
        }
        let mut pools = self
            .pools
            .write()
            .map_err(|_| TreeError::Storage("pool map lock poisoned".into()))?;
        Ok(pools
            .entry(pool_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(PoolTree::new())))
            .clone())
    }

    /// append a commitment to the pool's tree, persisting before returning
    ///
    /// the record is written from a candidate copy and only swapped into
    /// memory once the write lands, so a storage fault never leaves memory
    /// ahead of disk
    pub fn insert(&self, pool_id: &str, commitment: FieldElement) -> Result<Insertion> {
        let handle = self.pool_or_create(pool_id)?;
        let mut tree = handle
            .lock()
            .map_err(|_| TreeError::Storage(format!("pool {pool_id} lock poisoned")))?;

        let mut candidate = tree.clone();
        let insertion = candidate.insert(commitment)?;
        let record = bincode::serialize(&candidate)?;
        self.db.insert(pool_id.as_bytes(), record)?;
        self.db.flush()?;
        *tree = candidate;

        debug!(
            "pool {}: leaf {} committed, root {}",
            pool_id, insertion.index, insertion.new_root
        );
        Ok(insertion)
    }

    /// authentication path for a previously inserted leaf
    pub fn path(&self, pool_id: &str, index: u64) -> Result<MerklePath> {
        let handle = self
            .pool(pool_id)?
            .ok_or_else(|| TreeError::UnknownPool(pool_id.to_string()))?;
        let tree = handle
            .lock()
            .map_err(|_| TreeError::Storage(format!("pool {pool_id} lock poisoned")))?;
        tree.path(index)
    }

    /// latest root of the pool's tree
    pub fn root(&self, pool_id: &str) -> Result<FieldElement> {
        let handle = self
            .pool(pool_id)?
            .ok_or_else(|| TreeError::UnknownPool(pool_id.to_string()))?;
        let tree = handle
            .lock()
            .map_err(|_| TreeError::Storage(format!("pool {pool_id} lock poisoned")))?;
        Ok(tree.current_root())
    }

    /// whether `root` is in the pool's bounded history
    pub fn is_known_root(&self, pool_id: &str, root: &FieldElement) -> Result<bool> {
        let handle = self
            .pool(pool_id)?
            .ok_or_else(|| TreeError::UnknownPool(pool_id.to_string()))?;
        let tree = handle
            .lock()
            .map_err(|_| TreeError::Storage(format!("pool {pool_id} lock poisoned")))?;
        Ok(tree.is_known_root(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn commitment(n: u64) -> FieldElement {
        FieldElement::from_u64(n)
    }

    #[test]
    fn test_scenario_two_deposits() {
        let dir = tempdir().unwrap();
        let store = Accumulator::open(dir.path()).unwrap();

        let first = store.insert("P1", commitment(12345)).unwrap();
        assert_eq!(first.index, 0);

        let second = store.insert("P1", commitment(67890)).unwrap();
        assert_eq!(second.index, 1);
        assert_ne!(second.new_root, first.new_root);

        let path = store.path("P1", 0).unwrap();
        assert_eq!(path.siblings.len(), crate::TREE_DEPTH);
        let rebuilt = path.reconstruct_root(&commitment(12345)).unwrap();
        assert_eq!(rebuilt, second.new_root);
    }

    #[test]
    fn test_pools_are_independent() {
        let dir = tempdir().unwrap();
        let store = Accumulator::open(dir.path()).unwrap();

        let a = store.insert("A", commitment(1)).unwrap();
        let b = store.insert("B", commitment(2)).unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 0);
        assert_ne!(store.root("A").unwrap(), store.root("B").unwrap());
    }

    #[test]
    fn test_reopen_restores_state() {
        let dir = tempdir().unwrap();
        let root_before = {
            let store = Accumulator::open(dir.path()).unwrap();
            store.insert("P1", commitment(111)).unwrap();
            store.insert("P1", commitment(222)).unwrap();
            store.root("P1").unwrap()
        };

        let store = Accumulator::open(dir.path()).unwrap();
        assert_eq!(store.root("P1").unwrap(), root_before);
        // the next insert continues where the old process stopped
        let third = store.insert("P1", commitment(333)).unwrap();
        assert_eq!(third.index, 2);
        let path = store.path("P1", 1).unwrap();
        assert_eq!(
            path.reconstruct_root(&commitment(222)).unwrap(),
            third.new_root
        );
    }

    #[test]
    fn test_unknown_pool_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Accumulator::open(dir.path()).unwrap();
        assert!(matches!(
            store.path("nope", 0),
            Err(TreeError::UnknownPool(_))
        ));
    }

    #[test]
    fn test_concurrent_inserts_serialize_per_pool() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Accumulator::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for worker in 0..8u64 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mut indices = Vec::new();
                for n in 0..4u64 {
                    let insertion = store
                        .insert("shared", commitment(worker * 100 + n + 1))
                        .unwrap();
                    indices.push(insertion.index);
                }
                indices
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        // no index collisions and no gaps
        assert_eq!(all, (0..32).collect::<Vec<_>>());

        // the tree is still internally consistent
        let root = store.root("shared").unwrap();
        let path = store.path("shared", 0).unwrap();
        assert_eq!(path.root, root);
    }
}
