//! CoralDB Server Binary
//!
//! RESP-compatible in-memory data structure server. Flags mirror the config
//! file keys; when a config file is given, its values win.

use clap::Parser;
use coraldb::server::{Config, Server};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// CoralDB - in-memory data structure server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file, e.g. /etc/coraldb.conf
    #[arg(short, long)]
    config: Option<String>,

    /// Bind host ip
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listening port
    #[arg(short, long, default_value_t = 6380)]
    port: u16,

    /// Log directory
    #[arg(long, default_value = "./")]
    logdir: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// Shard count for the store (0 = auto-detect from CPU count)
    #[arg(long, default_value_t = 1024)]
    shardnum: usize,

    /// Number of databases
    #[arg(long, default_value_t = 16)]
    databases: usize,

    /// Run in replicated cluster mode
    #[arg(long, default_value_t = false)]
    cluster: bool,

    /// Comma separated cluster peers
    #[arg(long, default_value = "")]
    peer_addrs: String,

    /// This node's id (1-based) in cluster mode
    #[arg(long, default_value_t = -1)]
    node_id: i64,

    /// Address the replication transport binds to
    #[arg(long, default_value = "")]
    raft_addr: String,

    /// Join an existing cluster instead of bootstrapping
    #[arg(long, default_value_t = false)]
    join: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("coraldb={}", args.loglevel))),
        )
        .init();

    let mut config = Config::default()
        .with_host(&args.host)
        .with_port(args.port)
        .with_shard_num(args.shardnum);
    config.log_dir = args.logdir;
    config.log_level = args.loglevel;
    config.databases = args.databases;
    config.is_cluster = args.cluster;
    config.peer_addrs = args.peer_addrs;
    config.node_id = args.node_id;
    config.raft_addr = args.raft_addr;
    config.join_cluster = args.join;

    if let Some(path) = &args.config {
        config.parse_file(path)?;
    }
    config.finalize()?;

    info!(addr = %config.addr(), cluster = config.is_cluster, "starting coraldb");
    let server = Server::new(config);
    server.run().await?;
    Ok(())
}
