//! Server Module
//!
//! TCP accept loop, per-connection handlers, configuration and the database
//! manager. In cluster mode the server also wires up the replication
//! adapter and routes write commands through it.

pub mod config;
pub mod conn;
pub mod handler;
pub mod manager;
pub mod middleware;

pub use config::{Config, ConfigError};
pub use conn::ConnWriter;
pub use handler::Handler;
pub use manager::DbManager;
pub use middleware::{cluster_command_filter, Middleware};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cluster::{loopback_log, Applier, ClusterClient, PendingTable, SnapshotFn};
use crate::commands::Registry;
use crate::metrics::Metrics;

pub struct Server {
    config: Config,
    manager: Arc<DbManager>,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let manager = Arc::new(DbManager::new(config.databases, config.shard_num));
        Self {
            config,
            manager,
            registry: Arc::new(Registry::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn manager(&self) -> &Arc<DbManager> {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The snapshot-capture hook handed to the replication adapter.
    pub fn snapshot_fn(&self) -> SnapshotFn {
        let db = self.manager.db(0).clone();
        Arc::new(move || db.snapshot())
    }

    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, databases = self.manager.len(), shards = self.config.shard_num,
              "server listening");

        let root = CancellationToken::new();
        let mut middleware = Middleware::new();
        let cluster = if self.config.is_cluster {
            middleware.add(cluster_command_filter);
            let pending: PendingTable = Arc::new(DashMap::new());
            let log = loopback_log(64, self.snapshot_fn());
            let applier = Applier::new(
                log.commits,
                self.registry.clone(),
                self.manager.db(0).clone(),
                pending.clone(),
                root.child_token(),
            );
            tokio::spawn(applier.run());
            info!(node_id = self.config.node_id, raft_addr = %self.config.raft_addr,
                  peers = %self.config.peer_addrs, "cluster mode enabled");
            Some(Arc::new(ClusterClient::new(log.proposals, pending)))
        } else {
            None
        };
        let middleware = Arc::new(middleware);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("terminate signal received, shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        info!(%peer, "connected");
                        let handler = Handler {
                            registry: self.registry.clone(),
                            manager: self.manager.clone(),
                            metrics: self.metrics.clone(),
                            middleware: middleware.clone(),
                            cluster: cluster.clone(),
                        };
                        let token = root.child_token();
                        tokio::spawn(async move { handler.run(socket, token).await });
                    }
                    Err(err) => error!(%err, "accept error"),
                }
            }
        }
        // Cancel every connection and suspended operation, then let the
        // handlers unwind.
        root.cancel();
        info!(summary = %self.metrics.summary(), "bye");
        Ok(())
    }
}
