//! Command Registry
//!
//! Maps lower-cased command verbs to executors. The registry is built once
//! at startup and owned by the server; executors receive the database
//! handle, the raw argv, the connection's writer (for push-style commands)
//! and the connection's cancellation token.

mod hash;
mod keys;
mod list;
mod pubsub;
mod set;
mod sorted_set;
mod stream;
mod strings;

use bytes::Bytes;
use hashbrown::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::protocol::Frame;
use crate::server::conn::ConnWriter;
use crate::storage::Db;

/// Everything an executor needs for one command invocation.
pub struct CmdContext {
    pub db: Db,
    pub argv: Vec<Bytes>,
    pub conn: ConnWriter,
    pub cancel: CancellationToken,
}

impl CmdContext {
    /// Argument as a lossy string (keys and option words).
    pub fn arg_str(&self, i: usize) -> String {
        String::from_utf8_lossy(&self.argv[i]).into_owned()
    }

    /// Argument lower-cased, for option matching.
    pub fn arg_lower(&self, i: usize) -> String {
        self.arg_str(i).to_lowercase()
    }
}

/// An executor returns its reply, or `None` when it wrote to the connection
/// itself (or the client is gone).
pub type Executor = fn(CmdContext) -> Pin<Box<dyn Future<Output = Option<Frame>> + Send>>;

pub struct Registry {
    table: HashMap<&'static str, Executor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            table: HashMap::new(),
        };
        keys::register(&mut registry);
        strings::register(&mut registry);
        list::register(&mut registry);
        hash::register(&mut registry);
        set::register(&mut registry);
        sorted_set::register(&mut registry);
        stream::register(&mut registry);
        pubsub::register(&mut registry);
        registry
    }

    pub(crate) fn register(&mut self, name: &'static str, exec: Executor) {
        self.table.insert(name, exec);
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.table.contains_key(verb)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Look up the verb (case-insensitive) and run the executor.
    pub async fn dispatch(&self, ctx: CmdContext) -> Option<Frame> {
        if ctx.argv.is_empty() {
            return None;
        }
        let verb = String::from_utf8_lossy(&ctx.argv[0]).to_lowercase();
        match self.table.get(verb.as_str()) {
            Some(exec) => exec(ctx).await,
            None => Some(Frame::unknown_command(&verb)),
        }
    }
}

pub(crate) fn parse_i64(b: &[u8]) -> Option<i64> {
    std::str::from_utf8(b).ok()?.trim().parse().ok()
}

/// Float parse accepting `inf`/`+inf`/`-inf`; NaN is never a valid score.
pub(crate) fn parse_f64(b: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(b).ok()?.trim();
    let v = match s.to_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        _ => s.parse().ok()?,
    };
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Build a context from a space-separated command line.
    pub fn ctx(db: &Db, line: &str) -> CmdContext {
        CmdContext {
            db: db.clone(),
            argv: line
                .split_whitespace()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
            conn: ConnWriter::sink(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn reply_bytes(frame: Option<Frame>) -> Bytes {
        frame.expect("command produced a reply").to_bytes()
    }
}
