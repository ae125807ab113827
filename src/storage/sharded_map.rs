//! Sharded Concurrent Map
//!
//! A fixed number of independent hashmap shards, each behind its own
//! read/write lock, so unrelated keys never contend. The total count is
//! tracked with a relaxed atomic and is approximate across shards.

use hashbrown::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::RwLock;

/// Upper bound on the shard table size.
pub const MAX_SHARDS: usize = 1 << 16;

/// Stable key hash shared by the shard table and the key-lock stripes.
pub fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Concurrent map split into `shard_num` independently locked shards.
#[derive(Debug)]
pub struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
    count: AtomicIsize,
}

impl<V: Clone> ShardedMap<V> {
    /// Create a map with the given shard count. Out-of-range sizes are
    /// clamped rather than rejected.
    pub fn new(shard_num: usize) -> Self {
        let shard_num = shard_num.clamp(1, MAX_SHARDS);
        let mut shards = Vec::with_capacity(shard_num);
        for _ in 0..shard_num {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self {
            shards,
            count: AtomicIsize::new(0),
        }
    }

    pub fn shard_num(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        &self.shards[hash_key(key) as usize % self.shards.len()]
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).read().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).read().unwrap().contains_key(key)
    }

    /// Insert unconditionally. Returns true when the key was newly added.
    pub fn set(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).write().unwrap();
        let added = shard.insert(key.to_string(), value).is_none();
        if added {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        added
    }

    /// Insert only when the key is absent. Returns true when it was added.
    pub fn set_if_absent(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).write().unwrap();
        if shard.contains_key(key) {
            return false;
        }
        shard.insert(key.to_string(), value);
        self.count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Replace only when the key is present. Returns true when it was
    /// replaced.
    pub fn set_if_present(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).write().unwrap();
        match shard.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut shard = self.shard(key).write().unwrap();
        let removed = shard.remove(key).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Approximate total key count. Exactness across shards is not promised.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys. Each shard is read consistently, but the shards
    /// are visited one after another, so the snapshot is not a point-in-time
    /// view of the whole map.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let shard = shard.read().unwrap();
            keys.extend(shard.keys().cloned());
        }
        keys
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.write().unwrap();
            let drained = shard.len() as isize;
            shard.clear();
            self.count.fetch_sub(drained, Ordering::Relaxed);
        }
    }
}
