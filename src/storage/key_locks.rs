//! Key Lock Stripes
//!
//! A fixed array of read/write locks indexed by key hash. Executors take a
//! stripe lock around multi-step read-then-write logic so the shard locks of
//! the map itself never span command logic. Multi-key acquisition sorts and
//! deduplicates stripe indices first: two commands contending on overlapping
//! key sets always lock in the same global order, and two keys sharing a
//! stripe are locked once.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::sharded_map::hash_key;

#[derive(Debug)]
pub struct KeyLocks {
    stripes: Vec<RwLock<()>>,
}

impl KeyLocks {
    pub fn new(stripe_num: usize) -> Self {
        let stripe_num = stripe_num.max(1);
        let mut stripes = Vec::with_capacity(stripe_num);
        for _ in 0..stripe_num {
            stripes.push(RwLock::new(()));
        }
        Self { stripes }
    }

    pub fn stripe_num(&self) -> usize {
        self.stripes.len()
    }

    fn index(&self, key: &str) -> usize {
        hash_key(key) as usize % self.stripes.len()
    }

    pub fn lock(&self, key: &str) -> RwLockWriteGuard<'_, ()> {
        self.stripes[self.index(key)].write().unwrap()
    }

    pub fn rlock(&self, key: &str) -> RwLockReadGuard<'_, ()> {
        self.stripes[self.index(key)].read().unwrap()
    }

    fn ordered_indices(&self, keys: &[&str]) -> Vec<usize> {
        let mut indices: Vec<usize> = keys.iter().map(|k| self.index(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Write-lock the stripes of all `keys`, in globally consistent order.
    pub fn lock_multi(&self, keys: &[&str]) -> Vec<RwLockWriteGuard<'_, ()>> {
        self.ordered_indices(keys)
            .into_iter()
            .map(|i| self.stripes[i].write().unwrap())
            .collect()
    }

    /// Read-lock the stripes of all `keys`, in globally consistent order.
    pub fn rlock_multi(&self, keys: &[&str]) -> Vec<RwLockReadGuard<'_, ()>> {
        self.ordered_indices(keys)
            .into_iter()
            .map(|i| self.stripes[i].read().unwrap())
            .collect()
    }
}
