//! Value Union
//!
//! The store's value slot: a tagged variant per engine. Compound engines sit
//! behind their own locks so a shard lock is released before command logic
//! touches the engine; the stripe lock of the key serializes multi-step
//! mutations.

use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::list::List;
use super::sorted_set::SortedSet;
use super::stream::Stream;

#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    List(Arc<RwLock<List>>),
    Hash(Arc<RwLock<HashMap<String, Bytes>>>),
    Set(Arc<RwLock<HashSet<String>>>),
    Zset(Arc<RwLock<SortedSet>>),
    Stream(Arc<RwLock<Stream>>),
}

impl Value {
    pub fn new_list() -> Self {
        Value::List(Arc::new(RwLock::new(List::new())))
    }

    pub fn new_hash() -> Self {
        Value::Hash(Arc::new(RwLock::new(HashMap::new())))
    }

    pub fn new_set() -> Self {
        Value::Set(Arc::new(RwLock::new(HashSet::new())))
    }

    pub fn new_zset() -> Self {
        Value::Zset(Arc::new(RwLock::new(SortedSet::new())))
    }

    pub fn new_stream() -> Self {
        Value::Stream(Arc::new(RwLock::new(Stream::new())))
    }

    /// Name reported by TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::Zset(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }
}
