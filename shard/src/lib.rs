//! The cache shard worker (§4.4): one `DatasetMap<QFrame>` + one
//! `Statistics` ring + an optional `L2Store`, driven exclusively by a single
//! `tokio::spawn`ed task reading a bounded `mpsc` channel of
//! request/oneshot-reply calls. Because exactly one task ever touches the
//! shard's state, no `Arc<Mutex<_>>` is needed around it (§5:
//! "single-threaded/cooperative per shard").

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use qcache_common::error::{QError, QResult};
use qcache_common::time_util;
use qcache_datasetmap::DatasetMap;
use qcache_frame::ast::{parse_query, Query};
use qcache_frame::column::TypeHint;
use qcache_frame::eval::run_query;
use qcache_frame::io::{csv, json};
use qcache_frame::standin::StandInColumn;
use qcache_frame::{QFrame, Value};
use qcache_l2::L2Store;
use qcache_stats::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Csv,
    Json,
}

/// A successful query's payload plus the value the HTTP layer surfaces as
/// the `X-QCache-unsliced-length` response header (§6).
pub struct QueryResult {
    pub frame: QFrame,
    pub unsliced_length: usize,
}

pub struct InsertRequest {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: ContentType,
    pub type_hints: HashMap<String, TypeHint>,
    pub stand_ins: Vec<StandInColumn>,
}

enum Message {
    Insert { req: InsertRequest, reply: oneshot::Sender<QResult<()>> },
    Query { key: String, query: serde_json::Value, reply: oneshot::Sender<QResult<QueryResult>> },
    Delete { key: String, reply: oneshot::Sender<bool> },
    Statistics { reply: oneshot::Sender<serde_json::Map<String, serde_json::Value>> },
    Status { reply: oneshot::Sender<QResult<()>> },
    Reset { reply: oneshot::Sender<()> },
}

/// A cheap, cloneable client handle to a running shard task.
#[derive(Clone)]
pub struct ShardHandle {
    tx: mpsc::Sender<Message>,
}

impl ShardHandle {
    pub async fn insert(&self, req: InsertRequest) -> QResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Insert { req, reply }, rx).await?
    }

    pub async fn query(&self, key: String, query: serde_json::Value) -> QResult<QueryResult> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Query { key, query, reply }, rx).await?
    }

    pub async fn delete(&self, key: String) -> QResult<bool> {
        let (reply, rx) = oneshot::channel();
        Ok(self.send(Message::Delete { key, reply }, rx).await?)
    }

    pub async fn statistics(&self) -> QResult<serde_json::Map<String, serde_json::Value>> {
        let (reply, rx) = oneshot::channel();
        Ok(self.send(Message::Statistics { reply }, rx).await?)
    }

    pub async fn status(&self) -> QResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Status { reply }, rx).await?
    }

    pub async fn reset(&self) -> QResult<()> {
        let (reply, rx) = oneshot::channel();
        Ok(self.send(Message::Reset { reply }, rx).await?)
    }

    async fn send<T>(&self, msg: Message, rx: oneshot::Receiver<T>) -> QResult<T> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| QError::ShardUnavailable("shard worker has shut down".to_string()))?;
        rx.await
            .map_err(|_| QError::ShardUnavailable("shard worker dropped the reply channel".to_string()))
    }
}

/// Spawns the shard's task and returns a handle to it. `size_bytes`/`age_secs`
/// size the primary tier's `DatasetMap`; `l2_size_bytes == 0` disables L2.
pub fn spawn(size_bytes: usize, age_secs: u64, l2_size_bytes: usize, statistics_buffer_size: usize) -> ShardHandle {
    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(run(rx, size_bytes, age_secs, l2_size_bytes, statistics_buffer_size));
    ShardHandle { tx }
}

struct ShardState {
    primary: DatasetMap<QFrame>,
    l2: L2Store,
    stats: Statistics,
}

async fn run(
    mut rx: mpsc::Receiver<Message>,
    size_bytes: usize,
    age_secs: u64,
    l2_size_bytes: usize,
    statistics_buffer_size: usize,
) {
    let mut state = ShardState {
        primary: DatasetMap::new(size_bytes, age_secs),
        l2: L2Store::new(l2_size_bytes),
        stats: Statistics::new(statistics_buffer_size),
    };

    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Insert { req, reply } => {
                let result = handle_insert(&mut state, req);
                let _ = reply.send(result);
            }
            Message::Query { key, query, reply } => {
                let result = handle_query(&mut state, &key, &query);
                let _ = reply.send(result);
            }
            Message::Delete { key, reply } => {
                let primary_deleted = state.primary.delete(&key);
                let l2_deleted = state.l2.delete(&key);
                let _ = reply.send(primary_deleted || l2_deleted);
            }
            Message::Statistics { reply } => {
                let _ = reply.send(state.stats.snapshot());
            }
            Message::Status { reply } => {
                let _ = reply.send(Ok(()));
            }
            Message::Reset { reply } => {
                state.stats.reset(chrono::Utc::now());
                let _ = reply.send(());
            }
        }
    }
    warn!("shard request sender closed, shard task shutting down");
}

/// Evicts least-recently-used primary entries until `n_bytes` fits,
/// writing each evicted frame through to L2 (serialized as JSON, which
/// round-trips the null/empty-string distinction that CSV can't) so a
/// later query can rehydrate it instead of re-uploading (§4.5).
fn make_room(state: &mut ShardState, n_bytes: usize) -> QResult<()> {
    if n_bytes > state.primary.max_size() {
        return Err(QError::CapacityExceeded(n_bytes, state.primary.max_size()));
    }
    let now = time_util::now();
    while state.primary.max_size() - state.primary.size() < n_bytes {
        let Some((evicted_key, entry)) = state.primary.pop_lru() else {
            break;
        };
        state.stats.append(
            "durations_until_eviction",
            (now - entry.creation_time).num_milliseconds() as f64 / 1000.0,
        );
        state.stats.inc("size_evict_count", 1);
        if let Ok(bytes) = json::to_json(&entry.value) {
            let _ = state.l2.put(evicted_key, bytes, &mut state.stats);
        }
    }
    Ok(())
}

fn handle_insert(state: &mut ShardState, req: InsertRequest) -> QResult<()> {
    let started = time_util::now();
    let parsed = match req.content_type {
        ContentType::Csv => csv::from_csv(&req.body, &req.type_hints)?,
        ContentType::Json => json::from_json(&req.body, &req.type_hints)?,
    };
    let frame = parsed.apply_stand_ins(&req.stand_ins)?;

    let size = frame.byte_size();
    let replaced = state.primary.contains(&req.key);
    make_room(state, size)?;

    state.stats.extend("store_row_counts", [frame.row_count() as f64]);
    let row_count = frame.row_count();
    let key = req.key;
    debug!(%key, rows = row_count, bytes = size, "inserting dataset");
    state.primary.put(key, frame, size);
    if replaced {
        state.stats.inc("replace_count", 1);
    } else {
        state.stats.inc("store_count", 1);
    }
    state
        .stats
        .append("store_duration", time_util::elapsed_secs(started, time_util::now()));
    Ok(())
}

/// The §4.5 rehydration dance: a primary-tier miss falls through to L2; an
/// L2 hit is decoded, reinserted into the primary tier (so the next lookup
/// is a primary hit again), and returned to satisfy the current query.
fn rehydrate_from_l2(state: &mut ShardState, key: &str) -> QResult<QFrame> {
    let bytes = state
        .l2
        .get(key, &mut state.stats)
        .ok_or_else(|| QError::NotFound(key.to_string()))?;
    let frame = json::from_json(&bytes, &HashMap::new())?;
    let size = frame.byte_size();
    make_room(state, size)?;
    state.primary.put(key.to_string(), frame.clone(), size);
    state.stats.inc("store_count", 1);
    Ok(frame)
}

fn handle_query(state: &mut ShardState, key: &str, query_json: &serde_json::Value) -> QResult<QueryResult> {
    debug!(%key, "running query");
    let started = time_util::now();
    if state.primary.evict_if_too_old(key) {
        state.stats.inc("age_evict_count", 1);
    }

    let frame = match state.primary.get(key) {
        Some(entry) => {
            state.stats.inc("hit_count", 1);
            entry.value.clone()
        }
        None => {
            state.stats.inc("miss_count", 1);
            rehydrate_from_l2(state, key)?
        }
    };

    let query = parse_query(query_json)?;

    // An `update` clause mutates the cached frame in place and returns no
    // rows (§4.3.5/§6): it bypasses the SELECT pipeline entirely.
    if !query.update.is_empty() {
        let updated = qcache_frame::eval::update::apply_update(
            &frame,
            query.where_.as_ref(),
            &query.update,
            &|_| Err(QError::MalformedQuery("subqueries are not supported in an update filter".to_string())),
        )?;
        let size = updated.byte_size();
        make_room(state, size)?;
        state.primary.put(key.to_string(), updated, size);
        state
            .stats
            .append("shard_execution_duration", time_util::elapsed_secs(started, time_util::now()));
        return Ok(QueryResult { frame: QFrame::empty(), unsliced_length: 0 });
    }

    let result = run_subquery_aware(state, &frame, &query)?;

    state
        .stats
        .append("shard_execution_duration", time_util::elapsed_secs(started, time_util::now()));
    Ok(QueryResult { frame: result.0, unsliced_length: result.1 })
}

/// Runs `query` against `frame`, resolving any `in`-subquery's `from` against
/// this same shard's `DatasetMap` (cross-shard subqueries are out of scope,
/// §1). The lookup closure is passed explicitly into the evaluator rather
/// than relying on any shared/global state.
fn run_subquery_aware(state: &ShardState, frame: &QFrame, query: &Query) -> QResult<(QFrame, usize)> {
    let eval_subquery = |sub: &Query| -> QResult<Vec<Value>> {
        let source_key = sub
            .from
            .as_ref()
            .ok_or_else(|| QError::MalformedQuery("subquery is missing 'from'".to_string()))?;
        let source = state
            .primary
            .peek(source_key)
            .ok_or_else(|| QError::NotFound(source_key.clone()))?;
        let (result, _) = run_query(sub, source, &|_| {
            Err(QError::MalformedQuery("nested subqueries are not supported".to_string()))
        })?;
        let select_name = sub
            .select
            .first()
            .and_then(|item| match item {
                qcache_frame::ast::SelectItem::Column(name) => Some(name.clone()),
                qcache_frame::ast::SelectItem::Alias { target, .. } => Some(target.clone()),
                qcache_frame::ast::SelectItem::CountStar => None,
            })
            .unwrap_or_else(|| result.column_names().next().unwrap_or_default().to_string());
        let column = result.column(&select_name)?;
        Ok((0..result.row_count())
            .map(|row| qcache_frame::eval::filter::cell_value(column, row))
            .collect())
    };
    run_query(query, frame, &eval_subquery)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn insert_query_delete_roundtrip() {
        let handle = spawn(1_000_000, 0, 0, 1000);
        handle
            .insert(InsertRequest {
                key: "people".to_string(),
                body: b"name,age\nalice,30\nbob,25\n".to_vec(),
                content_type: ContentType::Csv,
                type_hints: HashMap::new(),
                stand_ins: Vec::new(),
            })
            .await
            .unwrap();

        let result = handle
            .query("people".to_string(), serde_json::json!({"where": [">", "age", 26]}))
            .await
            .unwrap();
        assert_eq!(result.frame.row_count(), 1);
        assert_eq!(result.unsliced_length, 1);

        assert!(handle.delete("people".to_string()).await.unwrap());
        assert!(handle.query("people".to_string(), serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn statistics_accumulate_across_requests() {
        let handle = spawn(1_000_000, 0, 0, 1000);
        handle
            .insert(InsertRequest {
                key: "t".to_string(),
                body: b"n\n1\n2\n".to_vec(),
                content_type: ContentType::Csv,
                type_hints: HashMap::new(),
                stand_ins: Vec::new(),
            })
            .await
            .unwrap();
        let _ = handle.query("t".to_string(), serde_json::json!({})).await.unwrap();
        let snap = handle.statistics().await.unwrap();
        assert_eq!(snap["store_count"], 1);
        assert_eq!(snap["hit_count"], 1);
    }
}
