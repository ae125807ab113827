//! Storage Engine
//!
//! Sharded concurrent map, key-lock stripes, TTL index and the typed value
//! engines behind them.

pub mod db;
pub mod key_locks;
pub mod list;
pub mod pubsub;
pub mod sharded_map;
pub mod sorted_set;
pub mod stream;
pub mod value;

pub use db::{now_secs, Db};
pub use key_locks::KeyLocks;
pub use list::List;
pub use pubsub::ChannelMap;
pub use sharded_map::ShardedMap;
pub use sorted_set::{AvlTree, ScoreNode, SortedSet, TreeVal};
pub use stream::{now_ms, Stream, StreamId};
pub use value::Value;
