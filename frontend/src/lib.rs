//! The front-end (§4.6): fans requests out to shards by consistent-hash
//! routing on the dataset key, and merges per-shard statistics/status when a
//! call spans every shard. One handle per worker, routed by key, same
//! shape as a node manager fanning calls out to workers it owns.

use std::collections::HashMap as StdHashMap;

use serde_json::{Map, Value};
use tracing::warn;

use qcache_common::error::QResult;
use qcache_ring::Ring;
use qcache_shard::{InsertRequest, QueryResult, ShardHandle};

/// Owns every shard handle plus the ring that routes keys to them. Built
/// once at start-up and shared read-only thereafter (§5: "immutable after
/// start-up; safe to read concurrently").
pub struct Frontend {
    ring: Ring<usize>,
    shards: Vec<ShardHandle>,
}

impl Frontend {
    /// `shards` must be indexed by the same ids the ring was (or will be)
    /// built over; we build the ring here from `0..shards.len()` so the two
    /// can never drift apart.
    pub fn new(shards: Vec<ShardHandle>) -> Self {
        assert!(!shards.is_empty(), "a front-end needs at least one shard");
        let ids: Vec<usize> = (0..shards.len()).collect();
        let ring = Ring::new(ids, &StdHashMap::new(), None);
        Frontend { ring, shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn route(&self, key: &str) -> &ShardHandle {
        let id = *self.ring.get_node(key);
        &self.shards[id]
    }

    pub async fn insert(&self, req: InsertRequest) -> QResult<()> {
        self.route(&req.key).insert(req).await
    }

    pub async fn query(&self, key: &str, query: Value) -> QResult<QueryResult> {
        self.route(key).query(key.to_string(), query).await
    }

    pub async fn delete(&self, key: &str) -> QResult<bool> {
        self.route(key).delete(key.to_string()).await
    }

    /// Fans out to every shard and merges: counters sum, buffers (arrays)
    /// concatenate in shard-index order, and `statistics_duration` /
    /// `statistics_buffer_size` are taken from the first shard, since every
    /// shard resets its clock on the same cadence (§4.1).
    pub async fn statistics(&self) -> QResult<Map<String, Value>> {
        let mut merged = Map::new();
        for (idx, shard) in self.shards.iter().enumerate() {
            let snap = shard.statistics().await?;
            for (name, value) in snap {
                if name == "statistics_duration" {
                    merged.entry(name).or_insert(value);
                    continue;
                }
                merge_stat(&mut merged, idx, name, value);
            }
        }
        Ok(merged)
    }

    /// First-non-OK-wins: returns the first shard's error, if any; `Ok(())`
    /// only when every shard reports healthy.
    pub async fn status(&self) -> QResult<()> {
        for (idx, shard) in self.shards.iter().enumerate() {
            if let Err(err) = shard.status().await {
                warn!(shard = idx, %err, "shard reported unhealthy status");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Resets every shard's statistics ring. Best-effort: a shard that fails
    /// to respond is reported but does not stop the others from resetting.
    pub async fn reset(&self) -> QResult<()> {
        let mut first_err = None;
        for (idx, shard) in self.shards.iter().enumerate() {
            if let Err(err) = shard.reset().await {
                warn!(shard = idx, %err, "failed to reset shard statistics");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn merge_stat(merged: &mut Map<String, Value>, idx: usize, name: String, value: Value) {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            let delta = n.as_i64().unwrap_or(0);
            let existing = merged.entry(name).or_insert(Value::from(0));
            if let Value::Number(cur) = existing {
                *existing = Value::from(cur.as_i64().unwrap_or(0) + delta);
            }
        }
        Value::Array(mut items) => {
            let existing = merged.entry(name).or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(buf) = existing {
                buf.append(&mut items);
            }
        }
        other => {
            // Anything neither a counter nor a buffer (shouldn't occur in
            // practice) is kept from the lowest-index shard that reported it.
            merged.entry(name).or_insert(other);
            let _ = idx;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn spawn_shards(n: usize) -> Vec<ShardHandle> {
        (0..n).map(|_| qcache_shard::spawn(1_000_000, 0, 0, 1000)).collect()
    }

    #[tokio::test]
    async fn routes_insert_query_delete_through_the_ring() {
        let front = Frontend::new(spawn_shards(4));
        front
            .insert(InsertRequest {
                key: "people".to_string(),
                body: b"name,age\nalice,30\nbob,25\n".to_vec(),
                content_type: qcache_shard::ContentType::Csv,
                type_hints: HashMap::new(),
                stand_ins: Vec::new(),
            })
            .await
            .unwrap();

        let result = front
            .query("people", serde_json::json!({"where": [">", "age", 26]}))
            .await
            .unwrap();
        assert_eq!(result.frame.row_count(), 1);

        assert!(front.delete("people").await.unwrap());
    }

    #[tokio::test]
    async fn statistics_sum_counters_across_shards() {
        let front = Frontend::new(spawn_shards(3));
        for i in 0..5 {
            front
                .insert(InsertRequest {
                    key: format!("d{i}"),
                    body: b"n\n1\n2\n".to_vec(),
                    content_type: qcache_shard::ContentType::Csv,
                    type_hints: HashMap::new(),
                    stand_ins: Vec::new(),
                })
                .await
                .unwrap();
        }
        let snap = front.statistics().await.unwrap();
        assert_eq!(snap["store_count"], Value::from(5));
    }

    #[tokio::test]
    async fn status_is_ok_when_every_shard_is_healthy() {
        let front = Frontend::new(spawn_shards(2));
        assert!(front.status().await.is_ok());
    }
}
