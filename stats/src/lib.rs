//! Per-shard statistics ring (spec §4.1): a keyed multimap of either
//! integer counters or bounded FIFO float buffers, with value-copy
//! snapshot + reset.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

const DEFAULT_BUFFER_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
enum Stat {
    Counter(i64),
    Buffer(VecDeque<f64>),
}

/// A statistics ring. Not `Sync` on its own — each shard owns one
/// exclusively, matching the single-threaded-per-shard concurrency model
/// in §5, so no internal locking is needed.
#[derive(Debug, Clone)]
pub struct Statistics {
    buffer_capacity: usize,
    stats: HashMap<String, Stat>,
    since: DateTime<Utc>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl Statistics {
    pub fn new(buffer_capacity: usize) -> Self {
        Statistics {
            buffer_capacity: buffer_capacity.max(1),
            stats: HashMap::new(),
            since: Utc::now(),
        }
    }

    /// Increments a named counter by `n` (creating it at 0 first if absent).
    pub fn inc(&mut self, name: &str, n: i64) {
        match self.stats.entry(name.to_string()).or_insert(Stat::Counter(0)) {
            Stat::Counter(c) => *c += n,
            Stat::Buffer(_) => {
                // A name switching kind mid-flight is a programming error
                // in the caller; recover by overwriting rather than
                // panicking, since stats must never crash a shard.
                self.stats.insert(name.to_string(), Stat::Counter(n));
            }
        }
    }

    /// Appends a single float sample to a named bounded buffer.
    pub fn append(&mut self, name: &str, v: f64) {
        let cap = self.buffer_capacity;
        let entry = self
            .stats
            .entry(name.to_string())
            .or_insert_with(|| Stat::Buffer(VecDeque::with_capacity(cap)));
        match entry {
            Stat::Buffer(buf) => {
                if buf.len() >= cap {
                    buf.pop_front();
                }
                buf.push_back(v);
            }
            Stat::Counter(_) => {
                let mut buf = VecDeque::with_capacity(cap);
                buf.push_back(v);
                self.stats.insert(name.to_string(), Stat::Buffer(buf));
            }
        }
    }

    /// Appends a sequence of samples, oldest first.
    pub fn extend(&mut self, name: &str, values: impl IntoIterator<Item = f64>) {
        for v in values {
            self.append(name, v);
        }
    }

    /// Snapshots all stats into a plain JSON-like map: counters become
    /// numbers, buffers become arrays. Adds `statistics_duration` (seconds
    /// since the last reset) and does not include `since`. The snapshot is
    /// a value copy — mutating it never aliases internal state. Resets
    /// counters/buffers and restarts the `since` clock, matching the
    /// Python source's `snapshot()` contract.
    pub fn snapshot(&mut self) -> Map<String, Value> {
        let now = Utc::now();
        let duration = (now - self.since).num_milliseconds() as f64 / 1000.0;

        let mut out = Map::new();
        for (name, stat) in self.stats.iter() {
            let value = match stat {
                Stat::Counter(c) => Value::from(*c),
                Stat::Buffer(buf) => Value::from(buf.iter().copied().collect::<Vec<_>>()),
            };
            out.insert(name.clone(), value);
        }
        out.insert("statistics_duration".to_string(), Value::from(duration.max(0.0)));

        self.reset(now);
        out
    }

    /// Clears every stat and restarts the `since` clock at `ts`.
    pub fn reset(&mut self, ts: DateTime<Utc>) {
        self.stats.clear();
        self.since = ts;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut s = Statistics::new(10);
        s.inc("hit_count", 1);
        s.inc("hit_count", 2);
        let snap = s.snapshot();
        assert_eq!(snap["hit_count"], Value::from(3));
    }

    #[test]
    fn buffers_are_bounded_fifo() {
        let mut s = Statistics::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.append("query_duration", v);
        }
        let snap = s.snapshot();
        assert_eq!(snap["query_duration"], Value::from(vec![2.0, 3.0, 4.0]));
    }

    #[test]
    fn snapshot_resets_and_is_a_value_copy() {
        let mut s = Statistics::new(10);
        s.inc("miss_count", 5);
        let snap1 = s.snapshot();
        assert_eq!(snap1["miss_count"], Value::from(5));
        assert!(!snap1.contains_key("since"));

        // A second snapshot taken immediately after must not see stale data.
        let snap2 = s.snapshot();
        assert!(snap2.get("miss_count").is_none());
    }

    #[test]
    fn extend_appends_in_order() {
        let mut s = Statistics::new(10);
        s.extend("store_row_counts", vec![1.0, 2.0, 3.0]);
        let snap = s.snapshot();
        assert_eq!(snap["store_row_counts"], Value::from(vec![1.0, 2.0, 3.0]));
    }
}
