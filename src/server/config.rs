//! Server Configuration
//!
//! Defaults, the `name value` config-file format (`#` comments, unknown
//! names kept as free-form options) and the cluster fields. The binary's
//! flags mirror these and the file, when present, wins.

use hashbrown::HashMap;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("given ip address {0} is invalid")]
    BadHost(String),
    #[error("listening port should be between 1024 and 65535, but {0} was given")]
    BadPort(i64),
    #[error("{name} should be a positive integer, got {value}")]
    BadNumber { name: &'static str, value: String },
    #[error("cluster mode requires a node id")]
    MissingNodeId,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The one port bound every configuration path enforces, flags included.
fn port_in_range(port: i64) -> bool {
    (1024..65535).contains(&port)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_dir: String,
    pub log_level: String,
    pub shard_num: usize,
    pub databases: usize,
    /// Unrecognized config-file entries, preserved verbatim.
    pub others: HashMap<String, String>,

    // Cluster surface.
    pub is_cluster: bool,
    pub peer_addrs: String,
    pub raft_addr: String,
    pub node_id: i64,
    pub join_cluster: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6380,
            log_dir: "./".to_string(),
            log_level: "info".to_string(),
            shard_num: 1024,
            databases: 16,
            others: HashMap::new(),
            is_cluster: false,
            peer_addrs: String::new(),
            raft_addr: String::new(),
            node_id: -1,
            join_cluster: false,
        }
    }
}

impl Config {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_shard_num(mut self, shard_num: usize) -> Self {
        self.shard_num = shard_num;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a `name value` config file into this config. Lines starting
    /// with `#` are comments; unknown names land in `others`.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
                continue;
            };
            let name = name.to_lowercase();
            match name.as_str() {
                "host" => {
                    if value.parse::<IpAddr>().is_err() {
                        return Err(ConfigError::BadHost(value.to_string()));
                    }
                    self.host = value.to_string();
                }
                "port" => {
                    let port: i64 = value.parse().map_err(|_| ConfigError::BadNumber {
                        name: "port",
                        value: value.to_string(),
                    })?;
                    if !port_in_range(port) {
                        return Err(ConfigError::BadPort(port));
                    }
                    self.port = port as u16;
                }
                "logdir" => self.log_dir = value.to_lowercase(),
                "loglevel" => self.log_level = value.to_lowercase(),
                "shardnum" => {
                    self.shard_num = value.parse().map_err(|_| ConfigError::BadNumber {
                        name: "shardnum",
                        value: value.to_string(),
                    })?;
                }
                "databases" => {
                    let n: i64 = value.parse().map_err(|_| ConfigError::BadNumber {
                        name: "databases",
                        value: value.to_string(),
                    })?;
                    if n <= 0 {
                        return Err(ConfigError::BadNumber {
                            name: "databases",
                            value: value.to_string(),
                        });
                    }
                    self.databases = n as usize;
                }
                _ => {
                    self.others.insert(name, value.to_string());
                }
            }
        }
        Ok(())
    }

    /// Final validation and cluster normalization. A shard count of zero
    /// auto-detects from the CPU count; cluster mode forces one database and
    /// derives the raft address from the peer list when unset.
    pub fn finalize(&mut self) -> Result<(), ConfigError> {
        if self.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::BadHost(self.host.clone()));
        }
        if !port_in_range(self.port as i64) {
            return Err(ConfigError::BadPort(self.port as i64));
        }
        if self.shard_num == 0 {
            self.shard_num = num_cpus::get() * 4;
        }
        if self.is_cluster {
            if self.node_id <= 0 {
                return Err(ConfigError::MissingNodeId);
            }
            self.databases = 1;
            if self.raft_addr.is_empty() {
                let peers: Vec<&str> = self.peer_addrs.split(',').collect();
                let idx = (self.node_id - 1) as usize;
                if let Some(addr) = peers.get(idx) {
                    self.raft_addr = addr.to_string();
                }
            }
        }
        Ok(())
    }
}
