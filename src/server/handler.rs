//! Connection Handler
//!
//! One handler per accepted connection: read frames, dispatch commands in
//! order, write replies through the serialized connection writer. Teardown
//! cancels the per-connection token, which unwinds subscriptions and
//! blocking pops belonging to this connection.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::conn::ConnWriter;
use super::manager::DbManager;
use super::middleware::Middleware;
use crate::cluster::{is_write_command, ClusterClient};
use crate::commands::{parse_i64, CmdContext, Registry};
use crate::metrics::Metrics;
use crate::protocol::{Frame, RespCodec};

pub struct Handler {
    pub registry: Arc<Registry>,
    pub manager: Arc<DbManager>,
    pub metrics: Arc<Metrics>,
    pub middleware: Arc<Middleware>,
    pub cluster: Option<Arc<ClusterClient>>,
}

impl Handler {
    pub async fn run(self, socket: TcpStream, cancel: CancellationToken) {
        let peer = socket
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        self.metrics.connection_opened();
        let (read_half, write_half) = socket.into_split();
        let conn = ConnWriter::new(write_half);
        let mut frames = FramedRead::new(read_half, RespCodec::new());
        let mut db_index = 0usize;

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = frames.next() => item,
            };
            match item {
                None => {
                    info!(peer = %peer, "connection closed");
                    break;
                }
                Some(Err(err)) if err.is_recoverable() => {
                    warn!(peer = %peer, %err, "protocol error");
                    if conn.write_frame(&Frame::error(err.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    error!(peer = %peer, %err, "read failed");
                    break;
                }
                Some(Ok(frame)) => {
                    let Some(argv) = frame.into_command() else {
                        warn!(peer = %peer, "ignoring non-command frame");
                        continue;
                    };
                    if argv.is_empty() {
                        continue;
                    }
                    let verb = String::from_utf8_lossy(&argv[0]).to_lowercase();
                    let started = Instant::now();
                    let reply = self
                        .execute(&verb, argv, &conn, &cancel, &mut db_index)
                        .await;
                    if let Some(reply) = reply {
                        if conn.write_frame(&reply).await.is_err() {
                            error!(peer = %peer, "write failed");
                            break;
                        }
                    }
                    self.metrics.record(&verb, started.elapsed());
                    debug!(peer = %peer, verb = %verb, latency = ?started.elapsed(), "command executed");
                }
            }
        }
        // Unwinds this connection's subscriptions and blocked pops.
        cancel.cancel();
        self.metrics.connection_closed();
    }

    async fn execute(
        &self,
        verb: &str,
        argv: Vec<bytes::Bytes>,
        conn: &ConnWriter,
        cancel: &CancellationToken,
        db_index: &mut usize,
    ) -> Option<Frame> {
        if let Err(reply) = self.middleware.apply(&argv) {
            return Some(reply);
        }
        // SELECT touches per-connection state, so it is handled here rather
        // than in the registry.
        if verb == "select" {
            return Some(self.select(&argv, db_index));
        }
        if let Some(cluster) = &self.cluster {
            if is_write_command(verb) {
                return Some(cluster.propose(&argv, cancel).await);
            }
        }
        let db = self.manager.db(*db_index).clone();
        self.registry
            .dispatch(CmdContext {
                db,
                argv,
                conn: conn.clone(),
                cancel: cancel.child_token(),
            })
            .await
    }

    fn select(&self, argv: &[bytes::Bytes], db_index: &mut usize) -> Frame {
        if argv.len() != 2 {
            return Frame::wrong_args("select");
        }
        let Some(index) = parse_i64(&argv[1]) else {
            return Frame::not_integer();
        };
        if index < 0 || index as usize >= self.manager.len() {
            return Frame::error(format!(
                "ERR DB index is out of range with maximum {}",
                self.manager.len()
            ));
        }
        *db_index = index as usize;
        Frame::ok()
    }
}
