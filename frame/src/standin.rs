//! Stand-in columns (spec §3): a dataset may declare that a missing column
//! should be synthesized from another column, or from a constant, instead
//! of the query failing with "unknown column". Declared once per dataset,
//! applied in order, skipped once the target already exists so a later
//! query result (or an explicit `update`) is never overwritten.

use qcache_common::error::{QError, QResult};

use crate::column::Column;
use crate::frame::QFrame;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum StandInSource {
    /// Copy an existing (possibly itself stand-in-produced) column verbatim.
    Column(String),
    /// Fill every row with the same constant.
    Const(Value),
}

#[derive(Debug, Clone)]
pub struct StandInColumn {
    pub target: String,
    pub source: StandInSource,
}

impl StandInColumn {
    pub fn apply(&self, frame: &QFrame) -> QResult<QFrame> {
        let column = match &self.source {
            StandInSource::Column(src) => frame.column(src)?.clone(),
            StandInSource::Const(value) => const_column(value, frame.row_count()),
        };
        frame.with_column(&self.target, column)
    }
}

fn const_column(value: &Value, row_count: usize) -> Column {
    match value {
        Value::Int(i) => Column::Int(vec![*i; row_count]),
        Value::Float(f) => Column::Float(vec![*f; row_count]),
        Value::Bool(b) => Column::Int(vec![if *b { 1 } else { 0 }; row_count]),
        Value::Str(s) => Column::Str(vec![Some(s.clone()); row_count]),
        Value::Null => Column::Float(vec![f64::NAN; row_count]),
    }
}

pub fn parse_stand_ins(raw: &serde_json::Value) -> QResult<Vec<StandInColumn>> {
    let arr = raw.as_array().ok_or_else(|| {
        QError::MalformedQuery("stand_in_columns must be a JSON array".to_string())
    })?;
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        let pair = entry.as_array().ok_or_else(|| {
            QError::MalformedQuery("each stand-in column must be a [target, source] pair".to_string())
        })?;
        if pair.len() != 2 {
            return Err(QError::MalformedQuery(
                "each stand-in column must be a [target, source] pair".to_string(),
            ));
        }
        let target = pair[0]
            .as_str()
            .ok_or_else(|| QError::MalformedQuery("stand-in target must be a string".to_string()))?
            .to_string();
        let source = match pair[1].as_str() {
            Some(name) => StandInSource::Column(name.to_string()),
            None => StandInSource::Const(Value::from_json(&pair[1])),
        };
        out.push(StandInColumn { target, source });
    }
    Ok(out)
}
