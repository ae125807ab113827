//! List Engine
//!
//! A deque of binary-safe byte strings with O(1) pushes and pops at both
//! ends. Indices may be negative (end-relative) everywhere the commands
//! accept them.

use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct List {
    items: VecDeque<Bytes>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lpush(&mut self, value: Bytes) {
        self.items.push_front(value);
    }

    pub fn rpush(&mut self, value: Bytes) {
        self.items.push_back(value);
    }

    pub fn lpop(&mut self) -> Option<Bytes> {
        self.items.pop_front()
    }

    pub fn rpop(&mut self) -> Option<Bytes> {
        self.items.pop_back()
    }

    /// Resolve an end-relative index to an absolute one; `None` when out of
    /// range.
    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let idx = if index < 0 { index + len } else { index };
        if idx < 0 || idx >= len {
            None
        } else {
            Some(idx as usize)
        }
    }

    pub fn index(&self, index: i64) -> Option<&Bytes> {
        self.resolve(index).and_then(|i| self.items.get(i))
    }

    pub fn set(&mut self, index: i64, value: Bytes) -> bool {
        match self.resolve(index) {
            Some(i) => {
                self.items[i] = value;
                true
            }
            None => false,
        }
    }

    /// Inclusive `[start, stop]` slice with end-relative indices and
    /// out-of-range clamping; inverted ranges are empty.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let len = self.items.len() as i64;
        let mut start = if start < 0 { start + len } else { start };
        let mut stop = if stop < 0 { stop + len } else { stop };
        if start < 0 {
            start = 0;
        }
        if stop >= len {
            stop = len - 1;
        }
        if start > stop || start >= len {
            return Vec::new();
        }
        self.items
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }

    /// Keep only `[start, stop]`, dropping everything outside.
    pub fn trim(&mut self, start: i64, stop: i64) {
        let kept = self.range(start, stop);
        self.items = kept.into();
    }

    /// Remove occurrences of `value`: `count > 0` removes up to count from
    /// the head, `count < 0` from the tail, `0` removes all. Returns the
    /// number removed.
    pub fn remove(&mut self, value: &[u8], count: i64) -> usize {
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < self.items.len() && removed < limit {
                if self.items[i].as_ref() == value {
                    self.items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = self.items.len();
            while i > 0 && removed < limit {
                i -= 1;
                if self.items[i].as_ref() == value {
                    self.items.remove(i);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Positions of `value` per the LPOS scan rules. `rank` must be nonzero:
    /// positive ranks scan head to tail skipping `rank - 1` matches, negative
    /// ranks scan tail to head skipping `|rank| - 1`. `count` caps the number
    /// of results (0 = unlimited) and `maxlen` caps the number of
    /// comparisons (0 = unlimited). Returned positions are always absolute
    /// from the head.
    pub fn positions(&self, value: &[u8], rank: i64, count: usize, maxlen: usize) -> Vec<usize> {
        if rank == 0 {
            return Vec::new();
        }
        let limit = if count == 0 { usize::MAX } else { count };
        let scan_cap = if maxlen == 0 { usize::MAX } else { maxlen };
        let mut skip = rank.unsigned_abs() as usize - 1;
        let mut found = Vec::new();
        let mut compared = 0;

        let indices: Box<dyn Iterator<Item = usize>> = if rank > 0 {
            Box::new(0..self.items.len())
        } else {
            Box::new((0..self.items.len()).rev())
        };
        for i in indices {
            if compared >= scan_cap || found.len() >= limit {
                break;
            }
            compared += 1;
            if self.items[i].as_ref() == value {
                if skip > 0 {
                    skip -= 1;
                } else {
                    found.push(i);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(items: &[&str]) -> List {
        let mut list = List::new();
        for item in items {
            list.rpush(Bytes::copy_from_slice(item.as_bytes()));
        }
        list
    }

    #[test]
    fn test_push_pop_order() {
        let mut list = List::new();
        list.lpush(Bytes::from_static(b"x"));
        list.lpush(Bytes::from_static(b"y"));
        list.lpush(Bytes::from_static(b"z"));
        assert_eq!(list.len(), 3);
        assert_eq!(
            list.range(0, -1),
            vec![
                Bytes::from_static(b"z"),
                Bytes::from_static(b"y"),
                Bytes::from_static(b"x")
            ]
        );
        assert_eq!(list.lpop(), Some(Bytes::from_static(b"z")));
        assert_eq!(list.rpop(), Some(Bytes::from_static(b"x")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_index_negative() {
        let list = list_of(&["a", "b", "c"]);
        assert_eq!(list.index(0).unwrap().as_ref(), b"a");
        assert_eq!(list.index(-1).unwrap().as_ref(), b"c");
        assert!(list.index(3).is_none());
        assert!(list.index(-4).is_none());
    }

    #[test]
    fn test_range_clamping() {
        let list = list_of(&["a", "b", "c", "d"]);
        assert_eq!(list.range(1, 100).len(), 3);
        assert_eq!(list.range(-2, -1).len(), 2);
        assert!(list.range(3, 1).is_empty());
        assert!(list.range(10, 20).is_empty());
    }

    #[test]
    fn test_trim() {
        let mut list = list_of(&["a", "b", "c", "d", "e"]);
        list.trim(1, 3);
        assert_eq!(
            list.range(0, -1),
            vec![
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c"),
                Bytes::from_static(b"d")
            ]
        );
        list.trim(5, 10);
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_directions() {
        let mut list = list_of(&["x", "y", "x", "y", "x"]);
        assert_eq!(list.remove(b"x", 2), 2);
        assert_eq!(list.range(0, -1)[0].as_ref(), b"y");
        let mut list = list_of(&["x", "y", "x", "y", "x"]);
        assert_eq!(list.remove(b"x", -1), 1);
        assert_eq!(list.index(-1).unwrap().as_ref(), b"y");
        let mut list = list_of(&["x", "y", "x"]);
        assert_eq!(list.remove(b"x", 0), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_positions() {
        let list = list_of(&["a", "b", "c", "b", "b"]);
        assert_eq!(list.positions(b"b", 1, 0, 0), vec![1, 3, 4]);
        assert_eq!(list.positions(b"b", 2, 1, 0), vec![3]);
        assert_eq!(list.positions(b"b", -1, 2, 0), vec![4, 3]);
        // maxlen bounds the scan distance
        assert_eq!(list.positions(b"b", 1, 0, 2), vec![1]);
        assert!(list.positions(b"z", 1, 0, 0).is_empty());
    }

    #[test]
    fn test_len_accounting() {
        let mut list = List::new();
        for i in 0..10 {
            list.rpush(Bytes::from(format!("v{}", i)));
        }
        list.lpop();
        list.rpop();
        list.trim(0, 3);
        assert_eq!(list.len(), 4);
    }
}
