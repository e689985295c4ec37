//! WHERE/UPDATE filter evaluation: turns a `Filter` AST into the set of
//! matching row indices. `in` subqueries and any future cross-frame lookups
//! are threaded through the explicit `eval_query` parameter — there is no
//! thread-local or process-global "current frame", by design.

use regex::RegexBuilder;

use qcache_common::error::{QError, QResult};

use crate::ast::{CmpOp, Filter, FilterArg, InSource};
use crate::column::Column;
use crate::frame::QFrame;
use crate::value::Value;

/// Evaluates `filter` against every row of `frame`, returning matching row
/// indices in ascending order. `eval_query` runs an `in`-subquery's `Query`
/// against the ambient dataset map and returns its first selected column's
/// values — passed in explicitly by the caller (shard/query layer) rather
/// than reached for via global state.
pub fn eval_filter<F>(filter: &Filter, frame: &QFrame, eval_subquery: &F) -> QResult<Vec<usize>>
where
    F: Fn(&crate::ast::Query) -> QResult<Vec<Value>>,
{
    let n = frame.row_count();
    let mut out = Vec::with_capacity(n);
    for row in 0..n {
        if matches_row(filter, frame, row, eval_subquery)? {
            out.push(row);
        }
    }
    Ok(out)
}

fn matches_row<F>(filter: &Filter, frame: &QFrame, row: usize, eval_subquery: &F) -> QResult<bool>
where
    F: Fn(&crate::ast::Query) -> QResult<Vec<Value>>,
{
    match filter {
        Filter::Compare(op, column, arg) => {
            let lhs_col = frame.column(column)?;
            if is_ordered(*op) && matches!(lhs_col, Column::Enum(_)) {
                return Err(QError::MalformedQuery(format!(
                    "ordered comparison on enum column '{column}' is not allowed"
                )));
            }
            if let FilterArg::Column(other) = arg {
                if is_ordered(*op) && matches!(frame.column(other)?, Column::Enum(_)) {
                    return Err(QError::MalformedQuery(format!(
                        "ordered comparison on enum column '{other}' is not allowed"
                    )));
                }
            }
            let lhs = cell_value(lhs_col, row);
            let rhs = match arg {
                FilterArg::Literal(v) => v.clone(),
                FilterArg::Column(other) => cell_value(frame.column(other)?, row),
            };
            compare(*op, &lhs, &rhs)
        }
        Filter::Not(inner) => Ok(!matches_row(inner, frame, row, eval_subquery)?),
        Filter::And(parts) => {
            for p in parts {
                if !matches_row(p, frame, row, eval_subquery)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(parts) => {
            for p in parts {
                if matches_row(p, frame, row, eval_subquery)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::IsNull(column) => Ok(frame.column(column)?.is_null_at(row)),
        Filter::In(column, source) => {
            let lhs = cell_value(frame.column(column)?, row);
            let candidates = match source {
                InSource::Literal(values) => values.clone(),
                InSource::Subquery(query) => eval_subquery(query)?,
            };
            Ok(candidates.iter().any(|c| values_equal(&lhs, c)))
        }
        Filter::Like { column, pattern, case_insensitive } => {
            let lhs = cell_value(frame.column(column)?, row);
            let Some(s) = lhs.as_str() else {
                return Ok(false);
            };
            like_matches(s, pattern, *case_insensitive)
        }
        Filter::AnyBits(column, mask) => {
            let Column::Int(v) = frame.column(column)? else {
                return Err(QError::MalformedQuery(format!(
                    "any_bits requires an int64 column, got '{column}'"
                )));
            };
            Ok(v[row] & mask != 0)
        }
        Filter::AllBits(column, mask) => {
            let Column::Int(v) = frame.column(column)? else {
                return Err(QError::MalformedQuery(format!(
                    "all_bits requires an int64 column, got '{column}'"
                )));
            };
            Ok(v[row] & mask == *mask)
        }
    }
}

pub fn cell_value(col: &Column, row: usize) -> Value {
    match col {
        Column::Int(v) => Value::Int(v[row]),
        Column::Float(v) => Value::Float(v[row]),
        Column::Str(v) => v[row].clone().map(Value::Str).unwrap_or(Value::Null),
        Column::Enum(v) => v.get(row).map(|s| Value::Str(s.to_string())).unwrap_or(Value::Null),
    }
}

/// `<`, `<=`, `>`, `>=` — rejected outright on an `enum` column by the
/// caller before `compare` is reached (open question, resolved strict).
fn is_ordered(op: CmpOp) -> bool {
    matches!(op, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge)
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> QResult<bool> {
    if op == CmpOp::Eq || op == CmpOp::Ne {
        let eq = values_equal(lhs, rhs);
        return Ok(if op == CmpOp::Eq { eq } else { !eq });
    }
    // Ordered comparisons: strict numeric-vs-numeric or string-vs-string.
    let ordering = lhs.partial_cmp_value(rhs).ok_or_else(|| {
        QError::MalformedQuery(format!(
            "cannot order-compare {lhs:?} and {rhs:?}: mismatched types"
        ))
    })?;
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() && b.is_null() {
        return false; // SQL-style null semantics: null never equals null
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// `%` is the only wildcard (matches any run of characters, including
/// none); everything else in the pattern is matched literally.
fn like_matches(value: &str, pattern: &str, case_insensitive: bool) -> QResult<bool> {
    let mut regex_src = String::from("^");
    for part in pattern.split('%') {
        if !regex_src.ends_with('^') {
            regex_src.push_str(".*");
        }
        regex_src.push_str(&regex::escape(part));
    }
    regex_src.push('$');
    let re = RegexBuilder::new(&regex_src)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| QError::MalformedQuery(format!("invalid like pattern '{pattern}': {e}")))?;
    Ok(re.is_match(value))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_filter;
    use crate::column::Column;
    use crate::frame::QFrame;
    use indexmap::IndexMap;

    fn sample_frame() -> QFrame {
        let mut cols = IndexMap::new();
        cols.insert("age".to_string(), Column::Int(vec![10, 20, 30]));
        cols.insert(
            "name".to_string(),
            Column::Str(vec![Some("alice".into()), Some("bob".into()), None]),
        );
        QFrame::new(cols).unwrap()
    }

    fn no_subquery(_: &crate::ast::Query) -> QResult<Vec<Value>> {
        Err(QError::MalformedQuery("no subqueries in this test".to_string()))
    }

    #[test]
    fn compares_and_connectives() {
        let frame = sample_frame();
        let filter = parse_filter(&serde_json::json!(["&", [">", "age", 15], ["!=", "name", "'bob'"]])).unwrap();
        let matched = eval_filter(&filter, &frame, &no_subquery).unwrap();
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn isnull_and_like() {
        let frame = sample_frame();
        let isnull = parse_filter(&serde_json::json!(["isnull", "name"])).unwrap();
        assert_eq!(eval_filter(&isnull, &frame, &no_subquery).unwrap(), vec![2]);

        let like = parse_filter(&serde_json::json!(["like", "name", "al%"])).unwrap();
        assert_eq!(eval_filter(&like, &frame, &no_subquery).unwrap(), vec![0]);
    }

    #[test]
    fn in_with_literal_list() {
        let frame = sample_frame();
        let filter = parse_filter(&serde_json::json!(["in", "age", [10, 30]])).unwrap();
        assert_eq!(eval_filter(&filter, &frame, &no_subquery).unwrap(), vec![0, 2]);
    }

    #[test]
    fn null_never_equals_null() {
        assert!(!values_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn ordered_comparison_on_enum_column_is_malformed() {
        let mut cols = IndexMap::new();
        cols.insert(
            "grade".to_string(),
            Column::Enum(crate::column::EnumColumn::from_strings(&[
                Some("a".into()),
                Some("b".into()),
            ])),
        );
        let frame = QFrame::new(cols).unwrap();

        let filter = parse_filter(&serde_json::json!([">", "grade", "'a'"])).unwrap();
        assert!(eval_filter(&filter, &frame, &no_subquery).is_err());

        let eq = parse_filter(&serde_json::json!(["==", "grade", "'a'"])).unwrap();
        assert_eq!(eval_filter(&eq, &frame, &no_subquery).unwrap(), vec![0]);
    }
}
