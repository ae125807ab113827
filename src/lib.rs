//! CoralDB - In-Memory Data Structure Server
//!
//! A RESP-compatible cache server: streaming wire codec, sharded concurrent
//! store with key-lock stripes and TTL expiry, typed value engines (strings,
//! lists, hashes, sets, ordered sets, entry logs), pub/sub fan-out and an
//! optional replicated-cluster adapter.

pub mod cluster;
pub mod commands;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::Registry;
pub use metrics::Metrics;
pub use protocol::{Frame, RespCodec};
pub use server::{Config, Server};
pub use storage::Db;
