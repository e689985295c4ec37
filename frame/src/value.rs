//! Scalar values: AST literals, cell values read out of a `QFrame`, and
//! aggregation/expression results all flow through this type.

use ordered_float::OrderedFloat;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Value {
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(f64::NAN),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
            || matches!(self, Value::Float(f) if f.is_nan())
    }

    /// Total ordering used for `order_by` and `min`/`max`: numeric types
    /// compare numerically, strings lexicographically, nulls sort first.
    /// Comparing a string against a number is the caller's job to reject
    /// as malformed; so is an ordered comparison on an `enum` column,
    /// rejected before a `Value` ever reaches here.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) => {
                let (af, bf) = (a.as_f64()?, b.as_f64()?);
                Some(OrderedFloat(af).cmp(&OrderedFloat(bf)))
            }
        }
    }
}
