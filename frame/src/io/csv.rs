//! CSV ingestion/serialization (§3, §6 `Content-Type: text/csv`).
//!
//! Column types are inferred per-column unless overridden by a caller-supplied
//! type hint: all-integer cells (ignoring blanks) become `int64`, all-numeric
//! become `float64` with blanks as null (NaN), anything else stays `string`
//! with blanks as a literal empty string (not null) — CSV has no separate
//! null token, so the string/numeric blank handling intentionally differs.

use std::collections::HashMap;

use indexmap::IndexMap;

use qcache_common::error::{QError, QResult};

use crate::column::{Column, EnumColumn, TypeHint};
use crate::frame::QFrame;

pub fn from_csv(data: &[u8], type_hints: &HashMap<String, TypeHint>) -> QResult<QFrame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| QError::MalformedQuery(format!("invalid CSV header: {e}")))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| QError::MalformedQuery(format!("invalid CSV row: {e}")))?;
        for (i, cell) in record.iter().enumerate() {
            if let Some(col) = raw.get_mut(i) {
                col.push(cell.to_string());
            }
        }
    }

    let mut columns = IndexMap::new();
    for (i, name) in headers.iter().enumerate() {
        let cells = &raw[i];
        let hint = type_hints.get(name).copied();
        columns.insert(name.clone(), infer_column(cells, hint));
    }
    QFrame::new(columns)
}

fn infer_column(cells: &[String], hint: Option<TypeHint>) -> Column {
    if let Some(TypeHint::Enum) = hint {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.clone()) })
            .collect();
        return Column::Enum(EnumColumn::from_strings(&values));
    }
    if hint == Some(TypeHint::String) {
        return Column::Str(
            cells
                .iter()
                .map(|c| Some(c.clone()))
                .collect(),
        );
    }

    if cells.iter().all(|c| c.is_empty() || c.parse::<i64>().is_ok()) && cells.iter().any(|c| !c.is_empty()) {
        return Column::Int(
            cells
                .iter()
                .map(|c| c.parse::<i64>().unwrap_or(0))
                .collect(),
        );
    }
    if cells.iter().all(|c| c.is_empty() || c.parse::<f64>().is_ok()) {
        return Column::Float(
            cells
                .iter()
                .map(|c| if c.is_empty() { f64::NAN } else { c.parse::<f64>().unwrap() })
                .collect(),
        );
    }
    Column::Str(cells.iter().map(|c| Some(c.clone())).collect())
}

pub fn to_csv(frame: &QFrame) -> QResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let names: Vec<&str> = frame.column_names().collect();
    writer
        .write_record(&names)
        .map_err(|e| QError::Io(e.to_string()))?;

    for row in 0..frame.row_count() {
        let mut record = Vec::with_capacity(names.len());
        for name in &names {
            let col = frame.column(name)?;
            record.push(cell_to_string(col, row));
        }
        writer
            .write_record(&record)
            .map_err(|e| QError::Io(e.to_string()))?;
    }
    writer.flush().map_err(|e| QError::Io(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| QError::Io(e.to_string()))
}

fn cell_to_string(col: &Column, row: usize) -> String {
    match col {
        Column::Int(v) => v[row].to_string(),
        Column::Float(v) => {
            if v[row].is_nan() {
                String::new()
            } else {
                v[row].to_string()
            }
        }
        Column::Str(v) => v[row].clone().unwrap_or_default(),
        Column::Enum(v) => v.get(row).unwrap_or("").to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn infers_int_float_string_columns() {
        let csv = b"id,score,name\n1,1.5,alice\n2,,bob\n3,3.5,\n";
        let frame = from_csv(csv, &HashMap::new()).unwrap();
        assert!(matches!(frame.column("id").unwrap(), Column::Int(_)));
        assert!(matches!(frame.column("score").unwrap(), Column::Float(_)));
        assert!(matches!(frame.column("name").unwrap(), Column::Str(_)));
        if let Column::Float(v) = frame.column("score").unwrap() {
            assert!(v[1].is_nan());
        }
        if let Column::Str(v) = frame.column("name").unwrap() {
            assert_eq!(v[2], Some(String::new()));
        }
    }

    #[test]
    fn round_trips_through_csv() {
        let csv = b"id,name\n1,alice\n2,bob\n";
        let frame = from_csv(csv, &HashMap::new()).unwrap();
        let out = to_csv(&frame).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id,name\n1,alice\n2,bob\n");
    }
}
