//! UPDATE evaluation (§4.3.5): in-place column assignment. The filter AST
//! is reused verbatim for the optional `where` clause — it is a strict
//! superset of what update needs, and nothing stops an update's `where`
//! from using operators a plain query's `where` would too.
//!
//! An update is an ordered list of entries, applied left-to-right rather
//! than depending on JSON-object key iteration order. Each entry is either:
//! - a simple assignment, `[target, expr]` — `target` becomes `expr`
//!   (a literal or another column) for every matched row;
//! - a self-referring update, `[op, target, expr]` — `target` becomes
//!   `target op expr` (e.g. `["+", "bar", 2.0]` is `bar = bar + 2.0`).

use serde_json::Value as Json;

use qcache_common::error::{QError, QResult};

use crate::column::Column;
use crate::eval::filter::{cell_value, eval_filter};
use crate::frame::QFrame;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone)]
pub enum UpdateExpr {
    Literal(Value),
    Column(String),
    Binary(UpdateOp, Box<UpdateExpr>, Box<UpdateExpr>),
}

#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub target: String,
    pub expr: UpdateExpr,
}

fn malformed(msg: impl Into<String>) -> QError {
    QError::MalformedQuery(msg.into())
}

pub fn parse_update(raw: &Json) -> QResult<Vec<UpdateAssignment>> {
    let arr = raw
        .as_array()
        .ok_or_else(|| malformed("update must be an array of [target, expr] or [op, target, expr] entries"))?;
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        let parts = entry
            .as_array()
            .ok_or_else(|| malformed("each update entry must be a [target, expr] or [op, target, expr] list"))?;
        out.push(match parts.len() {
            // Simple assignment: `[target, expr]`.
            2 => {
                let target = update_target(&parts[0])?;
                UpdateAssignment { target, expr: parse_update_expr(&parts[1])? }
            }
            // Self-referring update: `[op, target, expr]`, i.e. `target = target op expr`.
            3 => {
                let op = parts[0].as_str().ok_or_else(|| malformed("update operator must be a string"))?;
                let op = update_op(op).ok_or_else(|| malformed(format!("unknown update operator '{op}'")))?;
                let target = update_target(&parts[1])?;
                let rhs = parse_update_expr(&parts[2])?;
                UpdateAssignment {
                    expr: UpdateExpr::Binary(op, Box::new(UpdateExpr::Column(target.clone())), Box::new(rhs)),
                    target,
                }
            }
            _ => return Err(malformed("each update entry must be a [target, expr] or [op, target, expr] list")),
        });
    }
    Ok(out)
}

fn update_target(raw: &Json) -> QResult<String> {
    let target = raw.as_str().ok_or_else(|| malformed("update target must be a string"))?.to_string();
    if !crate::ast::is_valid_identifier(&target) {
        return Err(malformed(format!("invalid update target '{target}'")));
    }
    Ok(target)
}

fn parse_update_expr(raw: &Json) -> QResult<UpdateExpr> {
    match raw {
        Json::String(s) if crate::ast::is_quoted(s) => {
            Ok(UpdateExpr::Literal(Value::Str(s[1..s.len() - 1].to_string())))
        }
        Json::String(s) => Ok(UpdateExpr::Column(s.clone())),
        Json::Number(_) | Json::Bool(_) | Json::Null => Ok(UpdateExpr::Literal(Value::from_json(raw))),
        Json::Array(parts) => {
            if parts.len() != 3 {
                return Err(malformed(format!("invalid update expression: {raw}")));
            }
            let op = parts[0].as_str().ok_or_else(|| malformed("update operator must be a string"))?;
            let op = update_op(op).ok_or_else(|| malformed(format!("unknown update operator '{op}'")))?;
            Ok(UpdateExpr::Binary(
                op,
                Box::new(parse_update_expr(&parts[1])?),
                Box::new(parse_update_expr(&parts[2])?),
            ))
        }
        other => Err(malformed(format!("invalid update expression: {other}"))),
    }
}

fn update_op(op: &str) -> Option<UpdateOp> {
    Some(match op {
        "+" => UpdateOp::Add,
        "-" => UpdateOp::Sub,
        "*" => UpdateOp::Mul,
        "/" => UpdateOp::Div,
        "%" => UpdateOp::Mod,
        "**" => UpdateOp::Pow,
        "<<" => UpdateOp::Shl,
        ">>" => UpdateOp::Shr,
        "&" => UpdateOp::BitAnd,
        "|" => UpdateOp::BitOr,
        "^" => UpdateOp::BitXor,
        _ => return None,
    })
}

/// Applies every assignment, in order, to the rows matched by `filter`
/// (all rows if `None`). Each assignment's right-hand side is evaluated
/// against the frame as it stood *before this update call* — a target
/// referencing itself (`col = col + 1`) sees its own prior value, not a
/// partially-updated one, since we compute the whole new column before
/// calling `QFrame::with_column`.
pub fn apply_update<F>(
    frame: &QFrame,
    filter: Option<&crate::ast::Filter>,
    assignments: &[UpdateAssignment],
    eval_subquery: &F,
) -> QResult<QFrame>
where
    F: Fn(&crate::ast::Query) -> QResult<Vec<Value>>,
{
    let targets: Vec<usize> = match filter {
        Some(f) => eval_filter(f, frame, eval_subquery)?,
        None => (0..frame.row_count()).collect(),
    };

    let mut out = frame.clone();
    for assignment in assignments {
        let existing = out.column(&assignment.target).ok().cloned();
        let mut new_values: Vec<Value> = (0..out.row_count())
            .map(|row| existing.as_ref().map(|c| cell_value(c, row)).unwrap_or(Value::Null))
            .collect();

        for &row in &targets {
            new_values[row] = eval_update_expr(&assignment.expr, &out, row)?;
        }

        let column = assemble_column(&assignment.target, new_values, existing.as_ref())?;
        out = out.with_column(&assignment.target, column)?;
    }
    Ok(out)
}

fn eval_update_expr(expr: &UpdateExpr, frame: &QFrame, row: usize) -> QResult<Value> {
    match expr {
        UpdateExpr::Literal(v) => Ok(v.clone()),
        UpdateExpr::Column(name) => Ok(cell_value(frame.column(name)?, row)),
        UpdateExpr::Binary(op, a, b) => {
            let a = eval_update_expr(a, frame, row)?;
            let b = eval_update_expr(b, frame, row)?;
            apply_update_op(*op, &a, &b)
        }
    }
}

fn apply_update_op(op: UpdateOp, a: &Value, b: &Value) -> QResult<Value> {
    if let (Some(ia), Some(ib)) = (as_i64(a), as_i64(b)) {
        if matches!(op, UpdateOp::Shl | UpdateOp::Shr | UpdateOp::BitAnd | UpdateOp::BitOr | UpdateOp::BitXor) {
            return Ok(Value::Int(match op {
                UpdateOp::Shl => ia << ib,
                UpdateOp::Shr => ia >> ib,
                UpdateOp::BitAnd => ia & ib,
                UpdateOp::BitOr => ia | ib,
                UpdateOp::BitXor => ia ^ ib,
                _ => unreachable!(),
            }));
        }
        if matches!(op, UpdateOp::Add | UpdateOp::Sub | UpdateOp::Mul | UpdateOp::Mod) {
            return Ok(Value::Int(match op {
                UpdateOp::Add => ia + ib,
                UpdateOp::Sub => ia - ib,
                UpdateOp::Mul => ia * ib,
                UpdateOp::Mod => ia % ib,
                _ => unreachable!(),
            }));
        }
    }
    if matches!(op, UpdateOp::Shl | UpdateOp::Shr | UpdateOp::BitAnd | UpdateOp::BitOr | UpdateOp::BitXor) {
        return Err(QError::MalformedQuery(format!(
            "bitwise update operator requires integer operands, got {a:?} and {b:?}"
        )));
    }
    let (fa, fb) = (
        a.as_f64().ok_or_else(|| QError::MalformedQuery(format!("{a:?} is not numeric")))?,
        b.as_f64().ok_or_else(|| QError::MalformedQuery(format!("{b:?} is not numeric")))?,
    );
    Ok(Value::Float(match op {
        UpdateOp::Add => fa + fb,
        UpdateOp::Sub => fa - fb,
        UpdateOp::Mul => fa * fb,
        UpdateOp::Div => fa / fb,
        UpdateOp::Mod => fa % fb,
        UpdateOp::Pow => fa.powf(fb),
        UpdateOp::Shl | UpdateOp::Shr | UpdateOp::BitAnd | UpdateOp::BitOr | UpdateOp::BitXor => unreachable!(),
    }))
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn assemble_column(name: &str, values: Vec<Value>, existing: Option<&Column>) -> QResult<Column> {
    let all_int = values.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int && !matches!(existing, Some(Column::Float(_)) | Some(Column::Str(_)) | Some(Column::Enum(_))) {
        return Ok(Column::Int(values.into_iter().map(|v| match v {
            Value::Int(i) => i,
            _ => unreachable!(),
        }).collect()));
    }
    if let Some(Column::Str(_)) = existing {
        return Ok(Column::Str(values.into_iter().map(|v| match v {
            Value::Str(s) => Some(s),
            Value::Null => None,
            other => other.as_f64().map(|f| f.to_string()),
        }).collect()));
    }
    let floats = values
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| QError::MalformedQuery(format!("column '{name}' update produced a non-numeric value"))))
        .collect::<QResult<Vec<_>>>()?;
    Ok(Column::Float(floats))
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::IndexMap;

    fn no_subquery(_: &crate::ast::Query) -> QResult<Vec<Value>> {
        Err(QError::MalformedQuery("no subqueries in this test".to_string()))
    }

    fn basic_frame() -> QFrame {
        let mut cols = IndexMap::new();
        cols.insert("foo".to_string(), Column::Str(vec![Some("aaa".into()), Some("bbb".into())]));
        cols.insert("bar".to_string(), Column::Float(vec![1.25, 1.25]));
        QFrame::new(cols).unwrap()
    }

    #[test]
    fn quoted_string_where_arg_is_a_literal_not_a_column() {
        let frame = basic_frame();
        let filter = crate::ast::parse_filter(&serde_json::json!(["==", "foo", "'bbb'"])).unwrap();
        let assignments = parse_update(&serde_json::json!([["+", "bar", 2.0]])).unwrap();
        let updated = apply_update(&frame, Some(&filter), &assignments, &no_subquery).unwrap();

        let Column::Float(bar) = updated.column("bar").unwrap() else { panic!("expected float column") };
        assert_eq!(bar, &vec![1.25, 3.25]);
    }

    #[test]
    fn self_referring_update_reads_its_prior_value() {
        let frame = basic_frame();
        let assignments = parse_update(&serde_json::json!([["*", "bar", 2.0]])).unwrap();
        let updated = apply_update(&frame, None, &assignments, &no_subquery).unwrap();

        let Column::Float(bar) = updated.column("bar").unwrap() else { panic!("expected float column") };
        assert_eq!(bar, &vec![2.5, 2.5]);
    }

    #[test]
    fn invalid_update_target_is_rejected() {
        assert!(parse_update(&serde_json::json!([["+", "9bad", 1.0]])).is_err());
    }
}
