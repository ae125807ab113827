//! Server Metrics
//!
//! Per-verb dispatch statistics and connection lifecycle counters. The
//! handler records one sample per executed command, keyed by the lower-cased
//! verb, so hot commands (GET/SET) and slow ones (blocking pops, ZRANGE over
//! large sets) stay distinguishable in the shutdown summary.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Accumulated samples for one command verb.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbStats {
    pub calls: u64,
    pub latency_sum_us: u64,
    pub latency_max_us: u64,
}

impl VerbStats {
    fn observe(&mut self, latency_us: u64) {
        self.calls += 1;
        self.latency_sum_us += latency_us;
        self.latency_max_us = self.latency_max_us.max(latency_us);
    }

    pub fn avg_latency_us(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.latency_sum_us as f64 / self.calls as f64
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    verbs: RwLock<HashMap<String, VerbStats>>,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed command under its verb.
    pub fn record(&self, verb: &str, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        let mut verbs = self.verbs.write().unwrap();
        verbs.entry(verb.to_string()).or_default().observe(latency_us);
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections_opened_total(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Connections accepted but not yet torn down.
    pub fn connections_live(&self) -> u64 {
        self.connections_opened_total()
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }

    pub fn total_ops(&self) -> u64 {
        self.verbs.read().unwrap().values().map(|s| s.calls).sum()
    }

    pub fn verb_stats(&self, verb: &str) -> Option<VerbStats> {
        self.verbs.read().unwrap().get(verb).copied()
    }

    /// One-line shutdown summary: totals plus the busiest verb.
    pub fn summary(&self) -> String {
        let verbs = self.verbs.read().unwrap();
        let total: u64 = verbs.values().map(|s| s.calls).sum();
        let busiest = verbs
            .iter()
            .max_by_key(|(_, s)| s.calls)
            .map(|(verb, s)| {
                format!(
                    " busiest={} calls={} avg_us={:.1} max_us={}",
                    verb,
                    s.calls,
                    s.avg_latency_us(),
                    s.latency_max_us
                )
            })
            .unwrap_or_default();
        format!(
            "ops={} conns={}/{}{}",
            total,
            self.connections_live(),
            self.connections_opened_total(),
            busiest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_verb_latency_is_separate() {
        let metrics = Metrics::new();
        // A typical mix: cheap point reads, one write, one blocking pop that
        // sat at the poll interval before a value arrived.
        for us in [3, 5, 4] {
            metrics.record("get", Duration::from_micros(us));
        }
        metrics.record("zadd", Duration::from_micros(40));
        metrics.record("blpop", Duration::from_millis(100));

        let get = metrics.verb_stats("get").unwrap();
        assert_eq!(get.calls, 3);
        assert_eq!(get.latency_max_us, 5);
        assert!((get.avg_latency_us() - 4.0).abs() < 0.01);

        let blpop = metrics.verb_stats("blpop").unwrap();
        assert_eq!(blpop.calls, 1);
        assert_eq!(blpop.latency_max_us, 100_000);
        // The slow blocking pop must not bleed into the read stats.
        assert!(metrics.verb_stats("get").unwrap().latency_max_us < 100);

        assert_eq!(metrics.total_ops(), 5);
        assert!(metrics.verb_stats("del").is_none());
    }

    #[test]
    fn test_connection_counters() {
        let metrics = Metrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        assert_eq!(metrics.connections_opened_total(), 2);
        assert_eq!(metrics.connections_live(), 1);
    }

    #[test]
    fn test_summary_names_busiest_verb() {
        let metrics = Metrics::new();
        metrics.connection_opened();
        metrics.record("set", Duration::from_micros(10));
        metrics.record("get", Duration::from_micros(2));
        metrics.record("get", Duration::from_micros(2));
        let summary = metrics.summary();
        assert!(summary.contains("ops=3"));
        assert!(summary.contains("conns=1/1"));
        assert!(summary.contains("busiest=get"));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = Metrics::new();
        assert_eq!(metrics.total_ops(), 0);
        assert_eq!(metrics.connections_live(), 0);
        assert_eq!(metrics.summary(), "ops=0 conns=0/0");
    }
}
