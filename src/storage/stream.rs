//! Entry Log Engine
//!
//! An append-only log of field/value entries identified by composite IDs
//! `(timestamp-ms, sequence)` under strict lexicographic ordering. Appends
//! are O(1); the formatted-ID map gives payload lookup without walking the
//! ordered ID list.

use bytes::Bytes;
use hashbrown::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Composite entry ID, ordered by `(ms, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: i64,
    pub seq: i64,
}

impl StreamId {
    /// Smallest possible ID, the `-` range sentinel.
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    /// Largest possible ID, the `+` range sentinel.
    pub const MAX: StreamId = StreamId {
        ms: i64::MAX,
        seq: i64::MAX,
    };

    /// Canonical `<ms>-<seq>` form, e.g. `1667271690022-1`.
    pub fn format(&self) -> String {
        format!("{}-{}", self.ms, self.seq)
    }

    /// Parse `<ms>` or `<ms>-<seq>`; a missing sequence part takes
    /// `default_seq` so range endpoints can default differently.
    pub fn parse(text: &str, default_seq: i64) -> Option<StreamId> {
        let mut parts = text.splitn(2, '-');
        let ms: i64 = parts.next()?.parse().ok()?;
        let seq = match parts.next() {
            Some(seq) => seq.parse().ok()?,
            None => default_seq,
        };
        if ms < 0 || seq < 0 {
            return None;
        }
        Some(StreamId { ms, seq })
    }
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
pub struct Stream {
    /// IDs in append order; strictly increasing.
    ids: Vec<StreamId>,
    /// Formatted ID -> flat field/value payload.
    entries: HashMap<String, Vec<Bytes>>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn last_id(&self) -> Option<StreamId> {
        self.ids.last().copied()
    }

    /// Append with an explicit ID. Fails unless the ID is strictly greater
    /// than the current top.
    pub fn add(&mut self, id: StreamId, fields: Vec<Bytes>) -> Result<StreamId, ()> {
        if let Some(top) = self.last_id() {
            if id <= top {
                return Err(());
            }
        }
        self.entries.insert(id.format(), fields);
        self.ids.push(id);
        Ok(id)
    }

    /// Append with a generated ID: timestamp = now, sequence continues from
    /// the top entry when the timestamp has not advanced.
    pub fn add_auto(&mut self, fields: Vec<Bytes>) -> StreamId {
        let now = now_ms();
        let id = match self.last_id() {
            Some(top) if now <= top.ms => StreamId {
                ms: top.ms,
                seq: top.seq + 1,
            },
            _ => StreamId { ms: now, seq: 0 },
        };
        self.entries.insert(id.format(), fields);
        self.ids.push(id);
        id
    }

    /// Entries with `start <= id <= end`, in ID order.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<(StreamId, Vec<Bytes>)> {
        let mut out = Vec::new();
        for id in &self.ids {
            if *id > end {
                break;
            }
            if *id >= start {
                if let Some(fields) = self.entries.get(&id.format()) {
                    out.push((*id, fields.clone()));
                }
            }
        }
        out
    }

    fn drop_first(&mut self, n: usize) -> usize {
        let n = n.min(self.ids.len());
        for id in self.ids.drain(..n) {
            self.entries.remove(&id.format());
        }
        n
    }

    /// Drop oldest entries until at most `max_len` remain. `limit` caps the
    /// number of evictions for one call (0 = unbounded). Returns the number
    /// removed.
    pub fn trim_max_len(&mut self, max_len: usize, limit: usize) -> usize {
        let excess = self.ids.len().saturating_sub(max_len);
        let n = if limit == 0 { excess } else { excess.min(limit) };
        self.drop_first(n)
    }

    /// Drop entries with `id < min_id`, preserving the suffix. `limit` caps
    /// evictions as for [`Self::trim_max_len`]. Returns the number removed.
    pub fn trim_min_id(&mut self, min_id: StreamId, limit: usize) -> usize {
        let below = self.ids.partition_point(|id| *id < min_id);
        let n = if limit == 0 { below } else { below.min(limit) };
        self.drop_first(n)
    }
}
