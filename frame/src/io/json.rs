//! JSON ingestion/serialization (§3, §6 `Content-Type: application/json`):
//! an array of row objects. Columns are the union of all keys seen, in
//! first-occurrence order; a row missing a key gets null for that column,
//! preserving the true-null / empty-string distinction on round-trip.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value as Json;

use qcache_common::error::{QError, QResult};

use crate::column::{Column, EnumColumn, TypeHint};
use crate::frame::QFrame;

pub fn from_json(data: &[u8], type_hints: &HashMap<String, TypeHint>) -> QResult<QFrame> {
    let parsed: Json =
        serde_json::from_slice(data).map_err(|e| QError::MalformedQuery(format!("invalid JSON: {e}")))?;
    let rows = parsed
        .as_array()
        .ok_or_else(|| QError::MalformedQuery("JSON body must be an array of objects".to_string()))?;

    let mut order: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for row in rows {
        let obj = row
            .as_object()
            .ok_or_else(|| QError::MalformedQuery("each row must be a JSON object".to_string()))?;
        for key in obj.keys() {
            if seen.insert(key.clone()) {
                order.push(key.clone());
            }
        }
    }

    let mut raw: IndexMap<String, Vec<Json>> = IndexMap::new();
    for name in &order {
        raw.insert(name.clone(), Vec::with_capacity(rows.len()));
    }
    for row in rows {
        let obj = row.as_object().unwrap();
        for name in &order {
            raw.get_mut(name)
                .unwrap()
                .push(obj.get(name).cloned().unwrap_or(Json::Null));
        }
    }

    let mut columns = IndexMap::new();
    for (name, values) in raw {
        let hint = type_hints.get(&name).copied();
        columns.insert(name.clone(), build_column(&values, hint));
    }
    QFrame::new(columns)
}

fn build_column(values: &[Json], hint: Option<TypeHint>) -> Column {
    if hint == Some(TypeHint::Enum) {
        let strings: Vec<Option<String>> = values.iter().map(json_to_opt_string).collect();
        return Column::Enum(EnumColumn::from_strings(&strings));
    }
    if hint == Some(TypeHint::String) {
        return Column::Str(values.iter().map(json_to_opt_string).collect());
    }

    let has_null = values.iter().any(|v| v.is_null());
    let all_int = values.iter().all(|v| v.is_null() || v.as_i64().is_some());
    let all_numeric = values.iter().all(|v| v.is_null() || v.as_f64().is_some());

    if all_int && !has_null {
        return Column::Int(values.iter().map(|v| v.as_i64().unwrap_or(0)).collect());
    }
    if all_numeric {
        return Column::Float(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect(),
        );
    }
    Column::Str(values.iter().map(json_to_opt_string).collect())
}

fn json_to_opt_string(v: &Json) -> Option<String> {
    match v {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn to_json(frame: &QFrame) -> QResult<Vec<u8>> {
    let names: Vec<&str> = frame.column_names().collect();
    let mut rows = Vec::with_capacity(frame.row_count());
    for row in 0..frame.row_count() {
        let mut obj = serde_json::Map::new();
        for name in &names {
            let col = frame.column(name)?;
            obj.insert(name.to_string(), cell_to_json(col, row));
        }
        rows.push(Json::Object(obj));
    }
    serde_json::to_vec(&Json::Array(rows)).map_err(|e| QError::Io(e.to_string()))
}

fn cell_to_json(col: &Column, row: usize) -> Json {
    match col {
        Column::Int(v) => Json::from(v[row]),
        Column::Float(v) => {
            if v[row].is_nan() {
                Json::Null
            } else {
                serde_json::Number::from_f64(v[row])
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            }
        }
        Column::Str(v) => v[row].clone().map(Json::String).unwrap_or(Json::Null),
        Column::Enum(v) => v
            .get(row)
            .map(|s| Json::String(s.to_string()))
            .unwrap_or(Json::Null),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn union_of_keys_in_first_occurrence_order() {
        let data = br#"[{"a":1,"b":"x"},{"b":"y","c":2.5}]"#;
        let frame = from_json(data, &HashMap::new()).unwrap();
        let names: Vec<&str> = frame.column_names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(frame.row_count(), 2);
    }

    #[test]
    fn missing_key_becomes_null_distinct_from_empty_string() {
        let data = br#"[{"a":"x"},{"a":""},{}]"#;
        let frame = from_json(data, &HashMap::new()).unwrap();
        if let Column::Str(v) = frame.column("a").unwrap() {
            assert_eq!(v[0], Some("x".to_string()));
            assert_eq!(v[1], Some(String::new()));
            assert_eq!(v[2], None);
        } else {
            panic!("expected string column");
        }
    }

    #[test]
    fn round_trips_numeric_and_null() {
        let data = br#"[{"n":1},{"n":null}]"#;
        let frame = from_json(data, &HashMap::new()).unwrap();
        assert!(matches!(frame.column("n").unwrap(), Column::Float(_)));
        let out = to_json(&frame).unwrap();
        let back: Json = serde_json::from_slice(&out).unwrap();
        assert_eq!(back[1]["n"], Json::Null);
    }
}
