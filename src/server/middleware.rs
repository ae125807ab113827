//! Command Middleware
//!
//! A filter chain commands pass through before dispatch. Cluster mode
//! installs a filter rejecting the commands the replicated log cannot carry
//! yet.

use bytes::Bytes;

use crate::protocol::Frame;

/// A filter either lets the command through or produces the error reply.
pub type FilterFn = fn(&[Bytes]) -> Result<(), Frame>;

#[derive(Debug, Default)]
pub struct Middleware {
    filters: Vec<FilterFn>,
}

impl Middleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: FilterFn) {
        self.filters.push(filter);
    }

    pub fn apply(&self, argv: &[Bytes]) -> Result<(), Frame> {
        for filter in &self.filters {
            filter(argv)?;
        }
        Ok(())
    }
}

/// Pub/sub is served from local connection state, which a replicated log
/// cannot order; reject it in cluster mode.
pub fn cluster_command_filter(argv: &[Bytes]) -> Result<(), Frame> {
    let verb = String::from_utf8_lossy(&argv[0]).to_lowercase();
    if verb == "subscribe" || verb == "publish" {
        return Err(Frame::error(
            "ERR SUBSCRIBE and PUBLISH are not supported in cluster mode",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<Bytes> {
        line.split_whitespace()
            .map(|s| Bytes::from(s.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_chain_passes() {
        let chain = Middleware::new();
        assert!(chain.apply(&argv("set k v")).is_ok());
    }

    #[test]
    fn test_cluster_filter_blocks_pubsub() {
        let mut chain = Middleware::new();
        chain.add(cluster_command_filter);
        assert!(chain.apply(&argv("set k v")).is_ok());
        assert!(chain.apply(&argv("SUBSCRIBE ch")).is_err());
        assert!(chain.apply(&argv("publish ch msg")).is_err());
    }
}
