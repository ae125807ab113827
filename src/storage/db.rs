//! Database Facade
//!
//! One logical database: the sharded data map, the TTL index, the key-lock
//! stripes and the pub/sub channel map. Expiry is lazy (every command probes
//! `check_ttl` before touching a key) plus scheduled (each TTL set spawns a
//! timer that re-probes at the deadline); both paths delete under the same
//! stripe lock, and a stale fire is a no-op.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::key_locks::KeyLocks;
use super::pubsub::ChannelMap;
use super::sharded_map::ShardedMap;
use super::value::Value;
use crate::protocol::Frame;

/// Seconds since the unix epoch.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

#[derive(Debug)]
struct DbInner {
    data: ShardedMap<Value>,
    ttl: ShardedMap<i64>,
    locks: KeyLocks,
    channels: ChannelMap,
}

impl Db {
    pub fn new(shard_num: usize) -> Self {
        Self {
            inner: Arc::new(DbInner {
                data: ShardedMap::new(shard_num),
                ttl: ShardedMap::new(shard_num),
                // More stripes than shards so key locking stays finer grained
                // than the map partitioning.
                locks: KeyLocks::new(shard_num * 2),
                channels: ChannelMap::new(shard_num),
            }),
        }
    }

    pub fn data(&self) -> &ShardedMap<Value> {
        &self.inner.data
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.inner.locks
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.inner.channels
    }

    /// Probe the TTL of `key`, deleting the data and TTL entries when it has
    /// expired. Returns false when the key was expired and removed.
    ///
    /// Takes the key's stripe lock itself for the delete, so callers must
    /// probe before acquiring that lock or they will deadlock.
    pub fn check_ttl(&self, key: &str) -> bool {
        let Some(at) = self.inner.ttl.get(key) else {
            return true;
        };
        if at > now_secs() {
            return true;
        }
        let _guard = self.inner.locks.lock(key);
        self.inner.data.remove(key);
        self.inner.ttl.remove(key);
        false
    }

    /// Set an absolute expiry (unix seconds) on an existing key and schedule
    /// the delete. Returns 1 when set, 0 when the data key does not exist.
    pub fn set_ttl(&self, key: &str, at: i64) -> i64 {
        if self.inner.data.get(key).is_none() {
            debug!(key, "ttl on missing key is a no-op");
            return 0;
        }
        self.inner.ttl.set(key, at);
        let db = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let delay = (at - now_secs()).max(0) as u64;
            tokio::time::sleep(Duration::from_secs(delay)).await;
            // A later SETTTL may have pushed the deadline out; check_ttl
            // only deletes when the current deadline has truly passed.
            if !db.check_ttl(&key) {
                debug!(key, "ttl fired");
            }
        });
        1
    }

    pub fn ttl_of(&self, key: &str) -> Option<i64> {
        self.inner.ttl.get(key)
    }

    pub fn del_ttl(&self, key: &str) -> bool {
        self.inner.ttl.remove(key)
    }

    /// Delete the data and TTL entries. Callers hold the key's stripe lock.
    pub fn remove_key(&self, key: &str) -> bool {
        let removed = self.inner.data.remove(key);
        self.inner.ttl.remove(key);
        removed
    }

    /// Serialize the whole database as a RESP stream of rebuild commands.
    /// This is the opaque blob handed to the replication adapter's snapshot
    /// hook; replaying it through the normal command path restores the data.
    pub fn snapshot(&self) -> Bytes {
        fn cmd(args: Vec<Bytes>) -> Frame {
            Frame::Array(args.into_iter().map(Frame::Bulk).collect())
        }
        let mut buf = BytesMut::new();
        for key in self.inner.data.keys() {
            let Some(value) = self.inner.data.get(&key) else {
                continue;
            };
            let key_b = Bytes::from(key.clone());
            match value {
                Value::Str(b) => {
                    cmd(vec![Bytes::from_static(b"SET"), key_b.clone(), b]).encode(&mut buf);
                }
                Value::List(list) => {
                    let items = list.read().unwrap().range(0, -1);
                    if !items.is_empty() {
                        let mut args = vec![Bytes::from_static(b"RPUSH"), key_b.clone()];
                        args.extend(items);
                        cmd(args).encode(&mut buf);
                    }
                }
                Value::Hash(hash) => {
                    let hash = hash.read().unwrap();
                    if !hash.is_empty() {
                        let mut args = vec![Bytes::from_static(b"HSET"), key_b.clone()];
                        for (field, val) in hash.iter() {
                            args.push(Bytes::from(field.clone()));
                            args.push(val.clone());
                        }
                        cmd(args).encode(&mut buf);
                    }
                }
                Value::Set(set) => {
                    let set = set.read().unwrap();
                    if !set.is_empty() {
                        let mut args = vec![Bytes::from_static(b"SADD"), key_b.clone()];
                        args.extend(set.iter().map(|m| Bytes::from(m.clone())));
                        cmd(args).encode(&mut buf);
                    }
                }
                Value::Zset(zset) => {
                    let members = zset.read().unwrap().members_in_order();
                    if !members.is_empty() {
                        let mut args = vec![Bytes::from_static(b"ZADD"), key_b.clone()];
                        for (member, score) in members {
                            args.push(Bytes::from(score.to_string()));
                            args.push(Bytes::from(member));
                        }
                        cmd(args).encode(&mut buf);
                    }
                }
                Value::Stream(stream) => {
                    let stream = stream.read().unwrap();
                    for (id, fields) in stream.range(super::stream::StreamId::MIN, super::stream::StreamId::MAX) {
                        let mut args = vec![
                            Bytes::from_static(b"XADD"),
                            key_b.clone(),
                            Bytes::from(id.format()),
                        ];
                        args.extend(fields);
                        cmd(args).encode(&mut buf);
                    }
                }
            }
            if let Some(at) = self.inner.ttl.get(&key) {
                cmd(vec![
                    Bytes::from_static(b"EXPIRE"),
                    key_b,
                    Bytes::from((at - now_secs()).max(1).to_string()),
                ])
                .encode(&mut buf);
            }
        }
        buf.freeze()
    }
}
