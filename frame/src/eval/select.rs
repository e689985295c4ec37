//! SELECT evaluation (§4.3.4): projection, alias assignment with arithmetic
//! and scalar functions, and aggregation — either over the whole frame
//! (empty `group_by`) or per distinct `group_by` key. Arithmetic is always
//! carried out in `f64` (int columns promote), a deliberate simplification
//! recorded in the design notes rather than chasing per-op integer paths.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use indexmap::IndexMap;

use qcache_common::error::{QError, QResult};

use crate::ast::{AggFn, ArithOp, Expr, OrderBy, ScalarFn, SelectItem};
use crate::column::Column;
use crate::eval::filter::cell_value;
use crate::frame::QFrame;
use crate::value::Value;

pub fn apply_distinct(frame: &QFrame, columns: &[String]) -> QResult<QFrame> {
    if columns.is_empty() {
        return Ok(frame.clone());
    }
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut keep = Vec::new();
    for row in 0..frame.row_count() {
        let key = row_key(frame, columns, row)?;
        if let Entry::Vacant(e) = seen.entry(key) {
            e.insert(());
            keep.push(row);
        }
    }
    Ok(frame.take_rows(&keep))
}

fn row_key(frame: &QFrame, columns: &[String], row: usize) -> QResult<String> {
    let mut key = String::new();
    for name in columns {
        let v = cell_value(frame.column(name)?, row);
        key.push_str(&format!("{v:?}\u{1}"));
    }
    Ok(key)
}

fn expr_is_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Agg(_, _) | Expr::CountStar => true,
        Expr::Arith(_, a, b) => expr_is_aggregate(a) || expr_is_aggregate(b),
        Expr::Scalar(_, inner) => expr_is_aggregate(inner),
        Expr::Column(_) | Expr::Literal(_) => false,
    }
}

pub fn apply_select(frame: &QFrame, group_by: &[String], items: &[SelectItem]) -> QResult<QFrame> {
    if items.len() == 1 && matches!(items[0], SelectItem::CountStar) {
        return count_star_frame(frame, group_by);
    }

    let has_aggregate = items.iter().any(|item| match item {
        SelectItem::Alias { expr, .. } => expr_is_aggregate(expr),
        _ => false,
    });
    let has_plain_alias = items.iter().any(|item| match item {
        SelectItem::Alias { expr, .. } => !expr_is_aggregate(expr),
        _ => false,
    });
    if has_aggregate && has_plain_alias {
        return Err(QError::MalformedQuery(
            "select cannot mix aggregation with non-aggregate alias expressions".to_string(),
        ));
    }

    if has_aggregate || !group_by.is_empty() {
        apply_grouped_select(frame, group_by, items, has_aggregate)
    } else {
        apply_row_wise_select(frame, items)
    }
}

fn count_star_frame(frame: &QFrame, group_by: &[String]) -> QResult<QFrame> {
    if group_by.is_empty() {
        let mut columns = IndexMap::new();
        columns.insert("count".to_string(), Column::Int(vec![frame.row_count() as i64]));
        return QFrame::new(columns);
    }
    let groups = group_rows(frame, group_by)?;
    let mut columns: IndexMap<String, Vec<Value>> = group_by.iter().map(|c| (c.clone(), Vec::new())).collect();
    let mut counts = Vec::with_capacity(groups.len());
    for (key, rows) in &groups {
        for (name, value) in group_by.iter().zip(key.iter()) {
            columns.get_mut(name).expect("column initialized above").push(value.clone());
        }
        counts.push(rows.len() as i64);
    }
    let mut out = IndexMap::new();
    for (name, values) in columns {
        out.insert(name, value_vec_to_column(values));
    }
    out.insert("count".to_string(), Column::Int(counts));
    QFrame::new(out)
}

fn group_rows(frame: &QFrame, group_by: &[String]) -> QResult<Vec<(Vec<Value>, Vec<usize>)>> {
    let columns: Vec<&Column> = group_by.iter().map(|name| frame.column(name)).collect::<QResult<_>>()?;
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Vec<Value>, Vec<usize>)> = HashMap::new();
    for row in 0..frame.row_count() {
        let key_values: Vec<Value> = columns.iter().map(|col| cell_value(col, row)).collect();
        let key = key_values.iter().map(|v| format!("{v:?}\u{1}")).collect::<String>();
        match groups.entry(key.clone()) {
            Entry::Occupied(mut e) => e.get_mut().1.push(row),
            Entry::Vacant(e) => {
                order.push(key);
                e.insert((key_values, vec![row]));
            }
        }
    }
    Ok(order
        .into_iter()
        .map(|k| groups.remove(&k).expect("every recorded key has a group"))
        .collect())
}

fn apply_grouped_select(
    frame: &QFrame,
    group_by: &[String],
    items: &[SelectItem],
    has_aggregate: bool,
) -> QResult<QFrame> {
    let groups = group_rows(frame, group_by)?;

    // Without an aggregate present this is really just "distinct on group_by
    // plus passthrough of those columns" (group_by with no aggregating
    // select item).
    if !has_aggregate {
        for item in items {
            if let SelectItem::Column(name) = item {
                if !group_by.contains(name) {
                    return Err(QError::MalformedQuery(format!(
                        "select column '{name}' must be part of group_by when grouping without aggregation"
                    )));
                }
            }
        }
    }

    let mut out: IndexMap<String, Vec<Value>> = IndexMap::new();
    for item in items {
        let name = match item {
            SelectItem::Column(name) => name.clone(),
            SelectItem::Alias { target, .. } => target.clone(),
            SelectItem::CountStar => unreachable!("handled earlier"),
        };
        out.insert(name, Vec::with_capacity(groups.len()));
    }

    for (key_values, rows) in &groups {
        for item in items {
            match item {
                SelectItem::Column(name) => {
                    let pos = group_by
                        .iter()
                        .position(|g| g == name)
                        .ok_or_else(|| QError::MalformedQuery(format!("select column '{name}' must be part of group_by")))?;
                    out.get_mut(name).expect("column initialized above").push(key_values[pos].clone());
                }
                SelectItem::Alias { target, expr } => {
                    let value = eval_expr_in_group(expr, frame, rows)?;
                    out.get_mut(target).expect("column initialized above").push(value);
                }
                SelectItem::CountStar => unreachable!(),
            }
        }
    }

    let mut columns = IndexMap::new();
    for (name, values) in out {
        columns.insert(name, value_vec_to_column(values));
    }
    QFrame::new(columns)
}

fn apply_row_wise_select(frame: &QFrame, items: &[SelectItem]) -> QResult<QFrame> {
    let mut columns = IndexMap::new();
    for item in items {
        match item {
            SelectItem::Column(name) => {
                columns.insert(name.clone(), frame.column(name)?.clone());
            }
            SelectItem::Alias { target, expr } => {
                let mut values = Vec::with_capacity(frame.row_count());
                for row in 0..frame.row_count() {
                    values.push(eval_expr_row(expr, frame, row)?);
                }
                columns.insert(target.clone(), Column::Float(values));
            }
            SelectItem::CountStar => unreachable!("handled earlier"),
        }
    }
    QFrame::new(columns)
}

fn eval_expr_row(expr: &Expr, frame: &QFrame, row: usize) -> QResult<f64> {
    match expr {
        Expr::Column(name) => cell_value(frame.column(name)?, row)
            .as_f64()
            .ok_or_else(|| QError::MalformedQuery(format!("column '{name}' is not numeric"))),
        Expr::Literal(v) => v
            .as_f64()
            .ok_or_else(|| QError::MalformedQuery("literal is not numeric".to_string())),
        Expr::Arith(op, a, b) => {
            let (a, b) = (eval_expr_row(a, frame, row)?, eval_expr_row(b, frame, row)?);
            Ok(apply_arith(*op, a, b))
        }
        Expr::Scalar(f, inner) => Ok(apply_scalar(*f, eval_expr_row(inner, frame, row)?)),
        Expr::Agg(_, _) | Expr::CountStar => Err(QError::MalformedQuery(
            "aggregation function used outside of a grouped select".to_string(),
        )),
    }
}

fn eval_expr_in_group(expr: &Expr, frame: &QFrame, rows: &[usize]) -> QResult<Value> {
    match expr {
        Expr::Agg(AggFn::Count, inner) => {
            let mut count = 0i64;
            for &row in rows {
                if !is_null_expr(inner, frame, row)? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        Expr::CountStar => Ok(Value::Int(rows.len() as i64)),
        Expr::Agg(agg, inner) => {
            let mut values = Vec::with_capacity(rows.len());
            for &row in rows {
                let v = eval_expr_row(inner, frame, row)?;
                if !v.is_nan() {
                    values.push(v);
                }
            }
            Ok(Value::Float(aggregate(*agg, &values)))
        }
        Expr::Arith(op, a, b) => {
            let a = eval_expr_in_group(a, frame, rows)?.as_f64().unwrap_or(f64::NAN);
            let b = eval_expr_in_group(b, frame, rows)?.as_f64().unwrap_or(f64::NAN);
            Ok(Value::Float(apply_arith(*op, a, b)))
        }
        Expr::Scalar(f, inner) => {
            let v = eval_expr_in_group(inner, frame, rows)?.as_f64().unwrap_or(f64::NAN);
            Ok(Value::Float(apply_scalar(*f, v)))
        }
        Expr::Column(name) => {
            let row = *rows.first().ok_or_else(|| QError::MalformedQuery("empty group".to_string()))?;
            Ok(cell_value(frame.column(name)?, row))
        }
        Expr::Literal(v) => Ok(v.clone()),
    }
}

fn is_null_expr(expr: &Expr, frame: &QFrame, row: usize) -> QResult<bool> {
    if let Expr::Column(name) = expr {
        return Ok(frame.column(name)?.is_null_at(row));
    }
    Ok(eval_expr_row(expr, frame, row)?.is_nan())
}

fn apply_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b, // division by zero yields +/-inf or NaN, per IEEE 754
        ArithOp::Mod => a % b,
    }
}

fn apply_scalar(f: ScalarFn, a: f64) -> f64 {
    match f {
        ScalarFn::Sqrt => a.sqrt(),
        ScalarFn::Abs => a.abs(),
        ScalarFn::Sin => a.sin(),
        ScalarFn::Cos => a.cos(),
        ScalarFn::Tan => a.tan(),
        ScalarFn::Log => a.ln(),
        ScalarFn::Exp => a.exp(),
    }
}

fn aggregate(agg: AggFn, values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = values.iter().sum();
    let mean = sum / values.len() as f64;
    match agg {
        AggFn::Sum => sum,
        AggFn::Mean => mean,
        AggFn::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggFn::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggFn::Count => values.len() as f64,
        AggFn::Var => {
            if values.len() < 2 {
                f64::NAN
            } else {
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
            }
        }
        AggFn::Std => aggregate(AggFn::Var, values).sqrt(),
    }
}

fn value_vec_to_column(values: Vec<Value>) -> Column {
    let all_int = values.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int {
        return Column::Int(values.into_iter().map(|v| match v {
            Value::Int(i) => i,
            _ => unreachable!(),
        }).collect());
    }
    let all_numeric = values.iter().all(|v| v.as_f64().is_some() && !matches!(v, Value::Str(_)));
    if all_numeric {
        return Column::Float(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect());
    }
    Column::Str(values.into_iter().map(|v| match v {
        Value::Str(s) => Some(s),
        Value::Null => None,
        other => other.as_f64().map(|f| f.to_string()),
    }).collect())
}

pub fn apply_order_by(frame: &QFrame, order: &[OrderBy]) -> QResult<QFrame> {
    if order.is_empty() {
        return Ok(frame.clone());
    }
    let mut indices: Vec<usize> = (0..frame.row_count()).collect();
    let mut columns = Vec::with_capacity(order.len());
    for o in order {
        columns.push(frame.column(&o.column)?);
    }
    indices.sort_by(|&a, &b| {
        for (o, col) in order.iter().zip(columns.iter()) {
            let (va, vb) = (cell_value(col, a), cell_value(col, b));
            if let Some(ord) = va.partial_cmp_value(&vb) {
                let ord = if o.descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(frame.take_rows(&indices))
}

pub fn apply_offset_limit(frame: &QFrame, offset: Option<usize>, limit: Option<usize>) -> QFrame {
    let total = frame.row_count();
    let start = offset.unwrap_or(0).min(total);
    let end = match limit {
        Some(l) => (start + l).min(total),
        None => total,
    };
    frame.take_rows(&(start..end).collect::<Vec<_>>())
}
