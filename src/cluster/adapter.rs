//! Replication Adapter
//!
//! The interface the core sees of a replicated log: a sink for proposals, a
//! source of committed entries, a configuration-change sub-channel and a
//! snapshot-capture callback. Write commands are serialized to their wire
//! form, wrapped with a correlation id, proposed, and applied once on every
//! peer as they come back committed; the peer that originated a command
//! routes the apply-time reply back to the waiting connection.

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::commands::{CmdContext, Registry};
use crate::protocol::{Frame, RespCodec};
use crate::server::conn::ConnWriter;
use crate::storage::Db;

/// A command proposed to the log: its wire form plus the correlation id that
/// routes the reply back to the originating connection.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: Uuid,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfChangeKind {
    AddPeer,
    RemovePeer,
    UpdatePeer,
}

#[derive(Debug, Clone)]
pub struct ConfChange {
    pub kind: ConfChangeKind,
    pub node_id: u64,
    pub addr: String,
}

/// What the log hands back, in total order across peers.
#[derive(Debug, Clone)]
pub enum Commit {
    Entry(Proposal),
    ConfChange(ConfChange),
}

/// Callback capturing the whole store as an opaque blob, for log compaction.
pub type SnapshotFn = Arc<dyn Fn() -> Bytes + Send + Sync>;

/// Correlation id -> reply channel of the locally waiting request.
pub type PendingTable = Arc<DashMap<Uuid, oneshot::Sender<Frame>>>;

/// Serialize argv into the wire form carried by the log.
pub fn encode_command(argv: &[Bytes]) -> Bytes {
    Frame::Array(argv.iter().cloned().map(Frame::Bulk).collect()).to_bytes()
}

/// Inverse of [`encode_command`].
pub fn decode_command(data: &Bytes) -> Option<Vec<Bytes>> {
    let mut buf = BytesMut::from(data.as_ref());
    match RespCodec::new().decode(&mut buf) {
        Ok(Some(frame)) => frame.into_command(),
        _ => None,
    }
}

/// Which verbs mutate the store and therefore must flow through the log.
/// Reads are served locally.
pub fn is_write_command(verb: &str) -> bool {
    matches!(
        verb,
        "set" | "mset"
            | "del"
            | "expire"
            | "persist"
            | "rename"
            | "append"
            | "incr"
            | "decr"
            | "incrby"
            | "decrby"
            | "lpush"
            | "lpushx"
            | "rpush"
            | "rpushx"
            | "lpop"
            | "rpop"
            | "lset"
            | "lrem"
            | "ltrim"
            | "lmove"
            | "hset"
            | "hdel"
            | "sadd"
            | "srem"
            | "zadd"
            | "zrem"
            | "xadd"
    )
}

/// The connection handler's side of the adapter: propose and await the
/// committed reply.
pub struct ClusterClient {
    proposals: mpsc::Sender<Proposal>,
    pending: PendingTable,
}

impl ClusterClient {
    pub fn new(proposals: mpsc::Sender<Proposal>, pending: PendingTable) -> Self {
        Self { proposals, pending }
    }

    pub async fn propose(&self, argv: &[Bytes], cancel: &CancellationToken) -> Frame {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let proposal = Proposal {
            id,
            data: encode_command(argv),
        };
        if self.proposals.send(proposal).await.is_err() {
            self.pending.remove(&id);
            return Frame::error("ERR replication log unavailable");
        }
        tokio::select! {
            reply = rx => match reply {
                Ok(frame) => frame,
                Err(_) => Frame::error("ERR replication log unavailable"),
            },
            _ = cancel.cancelled() => {
                self.pending.remove(&id);
                Frame::error("ERR client disconnected before commit")
            }
        }
    }
}

/// Consumes the commit channel, re-executes each committed command locally
/// through the shared registry, and delivers replies to pending requests.
pub struct Applier {
    commits: mpsc::Receiver<Commit>,
    registry: Arc<Registry>,
    db: Db,
    pending: PendingTable,
    cancel: CancellationToken,
}

impl Applier {
    pub fn new(
        commits: mpsc::Receiver<Commit>,
        registry: Arc<Registry>,
        db: Db,
        pending: PendingTable,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            commits,
            registry,
            db,
            pending,
            cancel,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                commit = self.commits.recv() => match commit {
                    None => return,
                    Some(Commit::Entry(proposal)) => self.apply(proposal).await,
                    Some(Commit::ConfChange(change)) => {
                        info!(kind = ?change.kind, node = change.node_id, addr = %change.addr,
                              "configuration change applied");
                    }
                }
            }
        }
    }

    async fn apply(&self, proposal: Proposal) {
        let reply = match decode_command(&proposal.data) {
            Some(argv) => self
                .registry
                .dispatch(CmdContext {
                    db: self.db.clone(),
                    argv,
                    conn: ConnWriter::sink(),
                    cancel: self.cancel.child_token(),
                })
                .await
                .unwrap_or_else(|| Frame::error("ERR unknown error")),
            None => {
                error!(id = %proposal.id, "undecodable committed entry");
                Frame::error("ERR undecodable committed entry")
            }
        };
        // Only the originating peer has a waiter for this id.
        if let Some((_, tx)) = self.pending.remove(&proposal.id) {
            let _ = tx.send(reply);
        }
    }
}

/// Channel bundle the core hands to (or receives from) a log implementation.
pub struct LogChannels {
    pub proposals: mpsc::Sender<Proposal>,
    pub conf_changes: mpsc::Sender<ConfChange>,
    pub commits: mpsc::Receiver<Commit>,
}

/// In-process single-peer log: every proposal and configuration change
/// commits immediately, in arrival order. Stands in for the consensus
/// transport in single-node deployments and tests; compacts its tail by
/// capturing a snapshot every `COMPACT_EVERY` entries.
pub fn loopback_log(buffer: usize, snapshot: SnapshotFn) -> LogChannels {
    const COMPACT_EVERY: usize = 1024;
    let (prop_tx, mut prop_rx) = mpsc::channel::<Proposal>(buffer);
    let (conf_tx, mut conf_rx) = mpsc::channel::<ConfChange>(buffer);
    let (commit_tx, commit_rx) = mpsc::channel::<Commit>(buffer);
    tokio::spawn(async move {
        let mut entries_since_snapshot = 0usize;
        loop {
            let commit = tokio::select! {
                proposal = prop_rx.recv() => match proposal {
                    Some(p) => Commit::Entry(p),
                    None => return,
                },
                change = conf_rx.recv() => match change {
                    Some(c) => Commit::ConfChange(c),
                    None => return,
                },
            };
            if commit_tx.send(commit).await.is_err() {
                return;
            }
            entries_since_snapshot += 1;
            if entries_since_snapshot >= COMPACT_EVERY {
                let blob = snapshot();
                debug!(bytes = blob.len(), "log compacted behind snapshot");
                entries_since_snapshot = 0;
            }
        }
    });
    LogChannels {
        proposals: prop_tx,
        conf_changes: conf_tx,
        commits: commit_rx,
    }
}
