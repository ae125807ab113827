//! Cluster Mode
//!
//! The replication adapter: propose/commit plumbing and the reply routing
//! that turns a totally ordered write log into per-connection replies. The
//! consensus transport itself lives outside this crate.

mod adapter;

pub use adapter::{
    decode_command, encode_command, is_write_command, loopback_log, Applier, ClusterClient, Commit,
    ConfChange, ConfChangeKind, LogChannels, PendingTable, Proposal, SnapshotFn,
};
