//! End-to-end scenarios exercising the shard/frontend/frame stack together,
//! the same surface the HTTP layer is a thin translator over: insert,
//! query, filter, update, and the two eviction paths (size and age) plus
//! the L2 rehydration fallback.

use std::collections::HashMap;
use std::time::Duration;

use qcache_frame::column::Column;
use qcache_frontend::Frontend;
use qcache_shard::{spawn, ContentType, InsertRequest};

fn csv_insert(key: &str, body: &[u8]) -> InsertRequest {
    InsertRequest {
        key: key.to_string(),
        body: body.to_vec(),
        content_type: ContentType::Csv,
        type_hints: HashMap::new(),
        stand_ins: Vec::new(),
    }
}

/// S2: a conjunction of a quoted-string equality and a numeric comparison
/// narrows a 4-column frame down to exactly one row.
#[tokio::test]
async fn conjunction_of_equality_and_comparison_narrows_to_one_row() {
    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend
        .insert(csv_insert("basic", b"foo,bar,baz,qux\naaa,1,7,qqq\nbbb,2,3,rrr\n"))
        .await
        .unwrap();

    let result = frontend
        .query(
            "basic",
            serde_json::json!({"where": ["&", ["==", "qux", "'qqq'"], [">", "baz", 6]]}),
        )
        .await
        .unwrap();

    assert_eq!(result.frame.row_count(), 1);
    let Column::Str(foo) = result.frame.column("foo").unwrap() else { panic!("expected string column") };
    assert_eq!(foo, &vec![Some("aaa".to_string())]);
}

/// S3: an `in` filter against a literal list matches rows whose value is a
/// member, independent of list order.
#[tokio::test]
async fn in_filter_matches_literal_list_membership() {
    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend
        .insert(csv_insert("basic", b"foo,baz\naaa,7\nbbb,8\nccc,1\n"))
        .await
        .unwrap();

    let result = frontend
        .query("basic", serde_json::json!({"where": ["in", "baz", [5, 8, -2]]}))
        .await
        .unwrap();

    assert_eq!(result.frame.row_count(), 1);
    let Column::Str(foo) = result.frame.column("foo").unwrap() else { panic!("expected string column") };
    assert_eq!(foo, &vec![Some("bbb".to_string())]);
}

/// S4: an update with a `where` clause only touches the matched row (and a
/// quoted string in that clause is a literal, not a column reference),
/// persisting the change for later queries rather than returning rows
/// itself.
#[tokio::test]
async fn update_with_where_touches_only_matched_rows() {
    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend
        .insert(csv_insert("basic", b"foo,bar\naaa,1.25\nbbb,1.25\n"))
        .await
        .unwrap();

    let ack = frontend
        .query(
            "basic",
            serde_json::json!({"update": [["+", "bar", 2.0]], "where": ["==", "foo", "'bbb'"]}),
        )
        .await
        .unwrap();
    assert_eq!(ack.frame.row_count(), 0);

    let result = frontend.query("basic", serde_json::json!({})).await.unwrap();
    let Column::Str(foo) = result.frame.column("foo").unwrap() else { panic!("expected string column") };
    let Column::Float(bar) = result.frame.column("bar").unwrap() else { panic!("expected float column") };
    let bbb_row = foo.iter().position(|v| v.as_deref() == Some("bbb")).unwrap();
    let aaa_row = foo.iter().position(|v| v.as_deref() == Some("aaa")).unwrap();
    assert_eq!(bar[bbb_row], 3.25);
    assert_eq!(bar[aaa_row], 1.25);
}

/// S5: once the primary tier fills past its byte budget, inserting another
/// dataset evicts the least-recently-used one and the stats reflect it.
#[tokio::test]
async fn size_eviction_frees_room_and_is_recorded_in_stats() {
    // Each "n\n1\n2\n3\n" insert is a single 3-row int column (24 bytes); a
    // 50-byte budget fits two but forces the third to evict the first.
    let handle = spawn(50, 0, 0, 1000);
    handle.insert(csv_insert("a", b"n\n1\n2\n3\n")).await.unwrap();
    handle.insert(csv_insert("b", b"n\n1\n2\n3\n")).await.unwrap();
    handle.insert(csv_insert("c", b"n\n1\n2\n3\n")).await.unwrap();

    assert!(handle.query("a".to_string(), serde_json::json!({})).await.is_err());

    let snap = handle.statistics().await.unwrap();
    assert!(snap["size_evict_count"].as_i64().unwrap() > 0);
    let durations = snap["durations_until_eviction"].as_array().unwrap();
    assert!(durations.iter().any(|d| d.as_f64().unwrap() >= 0.0));
}

/// S6: once a dataset is older than `max_age_secs`, the next query against
/// its key treats it as gone and records an age-based eviction.
#[tokio::test]
async fn age_eviction_expires_stale_entries() {
    let handle = spawn(1_000_000, 1, 0, 1000);
    handle.insert(csv_insert("k", b"n\n1\n")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(handle.query("k".to_string(), serde_json::json!({})).await.is_err());

    let snap = handle.statistics().await.unwrap();
    assert_eq!(snap["age_evict_count"], serde_json::json!(1));
}

/// S7: a key evicted from the primary tier but still resident in L2
/// rehydrates transparently on the next query, and the hit is counted.
#[tokio::test]
async fn l2_rehydration_serves_an_evicted_key() {
    let handle = spawn(50, 0, 10_000, 1000);
    handle.insert(csv_insert("a", b"n\n1\n2\n3\n")).await.unwrap();
    handle.insert(csv_insert("b", b"n\n1\n2\n3\n")).await.unwrap();
    handle.insert(csv_insert("c", b"n\n1\n2\n3\n")).await.unwrap();

    // "a" was the least-recently-used dataset and should have been pushed
    // down to L2 by the inserts above; querying it again pulls it back in.
    let result = handle.query("a".to_string(), serde_json::json!({})).await.unwrap();
    assert_eq!(result.frame.row_count(), 3);

    let snap = handle.statistics().await.unwrap();
    assert!(snap["l2_hit_count"].as_i64().unwrap() >= 1);
}

/// A query result's `unsliced_length` reports the full match count even
/// when `limit` truncates the returned rows, matching the
/// `X-QCache-unsliced-length` header the HTTP layer surfaces.
#[tokio::test]
async fn unsliced_length_reports_full_match_count_under_limit() {
    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend
        .insert(csv_insert("basic", b"index,foo,bar\n1,bbb,1.25\n2,aaa,3.25\n3,ccc,\n"))
        .await
        .unwrap();

    let result = frontend.query("basic", serde_json::json!({"limit": 2})).await.unwrap();
    assert_eq!(result.frame.row_count(), 2);
    assert_eq!(result.unsliced_length, 3);
}

/// Stand-in columns declared on insert fill in a missing column without
/// overwriting one that's actually present in the source data.
#[tokio::test]
async fn stand_in_columns_fill_missing_values_without_overwriting() {
    use qcache_frame::standin::{StandInColumn, StandInSource};

    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend
        .insert(InsertRequest {
            key: "basic".to_string(),
            body: b"foo\naaa\nbbb\n".to_vec(),
            content_type: ContentType::Csv,
            type_hints: HashMap::new(),
            stand_ins: vec![StandInColumn {
                target: "extra".to_string(),
                source: StandInSource::Const(qcache_frame::Value::Int(42)),
            }],
        })
        .await
        .unwrap();

    let result = frontend.query("basic", serde_json::json!({})).await.unwrap();
    let Column::Int(extra) = result.frame.column("extra").unwrap() else { panic!("expected int column") };
    assert_eq!(extra, &vec![42, 42]);
}

/// Deleting a dataset removes it from both tiers: a later query 404s and a
/// second delete is a harmless no-op.
#[tokio::test]
async fn delete_removes_dataset_and_is_idempotent() {
    let frontend = Frontend::new(vec![spawn(1_000_000, 0, 0, 1000)]);
    frontend.insert(csv_insert("basic", b"n\n1\n")).await.unwrap();

    assert!(frontend.delete("basic").await.unwrap());
    assert!(!frontend.delete("basic").await.unwrap());
    assert!(frontend.query("basic", serde_json::json!({})).await.is_err());
}
