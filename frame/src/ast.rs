//! The JSON query AST (§4.3.2-§4.3.4): a small Lisp-ish shape, e.g.
//! `["==", "col", 1]`, `["&", a, b]`, `["in", "col", [1, 2, 3]]`. Parsing is
//! strict: any shape that doesn't match one of the closed operator sets is
//! rejected with `QError::MalformedQuery` naming the offending sub-AST
//! (§4.3.7), never silently coerced.

use serde_json::Value as Json;

use qcache_common::error::{QError, QResult};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum FilterArg {
    Literal(Value),
    Column(String),
}

#[derive(Debug, Clone)]
pub enum InSource {
    Literal(Vec<Value>),
    Subquery(Box<Query>),
}

/// The WHERE/UPDATE filter AST. A comparison's column operand is always the
/// first positional argument — confirmed against the original source's
/// `pandas_filter.py`, which destructures every triple as `op, col_name, arg`.
#[derive(Debug, Clone)]
pub enum Filter {
    Compare(CmpOp, String, FilterArg),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    In(String, InSource),
    IsNull(String),
    Like { column: String, pattern: String, case_insensitive: bool },
    AnyBits(String, i64),
    AllBits(String, i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFn {
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Sum,
    Mean,
    Max,
    Min,
    Count,
    Std,
    Var,
}

/// A scalar/aggregation expression, as used on the right-hand side of a
/// select alias assignment `["=", "target", expr]`.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Scalar(ScalarFn, Box<Expr>),
    Agg(AggFn, Box<Expr>),
    /// `[['count']]` with no argument: row count of the (group's) frame.
    CountStar,
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    Column(String),
    Alias { target: String, expr: Expr },
    CountStar,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Only meaningful for a subquery nested inside an `in` filter: the
    /// dataset key to run the subquery against. Absent for a top-level
    /// query, whose target dataset is already fixed by the request path.
    pub from: Option<String>,
    pub where_: Option<Filter>,
    pub group_by: Vec<String>,
    pub distinct: Vec<String>,
    pub select: Vec<SelectItem>,
    pub order_by: Vec<OrderBy>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    /// `[[target, expr], ...]` in-place assignments (§4.3.5). Mutually
    /// exclusive in practice with the SELECT clauses above: a query with a
    /// non-empty `update` does not return rows (§6).
    pub update: Vec<crate::eval::update::UpdateAssignment>,
}

const KNOWN_KEYS: &[&str] = &[
    "from", "where", "group_by", "distinct", "select", "order_by", "offset", "limit", "update",
];

fn malformed(msg: impl Into<String>) -> QError {
    QError::MalformedQuery(msg.into())
}

pub fn parse_query(raw: &Json) -> QResult<Query> {
    let obj = raw
        .as_object()
        .ok_or_else(|| malformed("query must be a JSON object"))?;

    for key in obj.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            return Err(malformed(format!("unknown query clause '{key}'")));
        }
    }

    let mut q = Query::default();

    if let Some(f) = obj.get("from") {
        q.from = Some(
            f.as_str()
                .ok_or_else(|| malformed("from must be a dataset key string"))?
                .to_string(),
        );
    }
    if let Some(w) = obj.get("where") {
        q.where_ = Some(parse_filter(w)?);
    }
    if let Some(g) = obj.get("group_by") {
        q.group_by = parse_string_list(g, "group_by")?;
    }
    if let Some(d) = obj.get("distinct") {
        q.distinct = parse_string_list(d, "distinct")?;
    }
    if let Some(s) = obj.get("select") {
        q.select = parse_select(s)?;
    }
    if let Some(o) = obj.get("order_by") {
        q.order_by = parse_order_by(o)?;
    }
    if let Some(off) = obj.get("offset") {
        q.offset = Some(
            off.as_u64()
                .ok_or_else(|| malformed("offset must be a non-negative integer"))? as usize,
        );
    }
    if let Some(lim) = obj.get("limit") {
        q.limit = Some(
            lim.as_u64()
                .ok_or_else(|| malformed("limit must be a non-negative integer"))? as usize,
        );
    }
    if let Some(u) = obj.get("update") {
        q.update = crate::eval::update::parse_update(u)?;
    }

    Ok(q)
}

fn parse_string_list(raw: &Json, field: &str) -> QResult<Vec<String>> {
    raw.as_array()
        .ok_or_else(|| malformed(format!("{field} must be an array of column names")))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| malformed(format!("{field} entries must be strings")))
        })
        .collect()
}

/// Each entry is a column name, optionally led by `-` for descending
/// (`"-foo"` sorts by `foo` descending; `"foo"` ascending).
fn parse_order_by(raw: &Json) -> QResult<Vec<OrderBy>> {
    raw.as_array()
        .ok_or_else(|| malformed("order_by must be an array"))?
        .iter()
        .map(|entry| match entry {
            Json::String(s) => match s.strip_prefix('-') {
                Some(column) => Ok(OrderBy { column: column.to_string(), descending: true }),
                None => Ok(OrderBy { column: s.clone(), descending: false }),
            },
            other => Err(malformed(format!("invalid order_by entry: {other}"))),
        })
        .collect()
}

fn parse_select(raw: &Json) -> QResult<Vec<SelectItem>> {
    let arr = raw
        .as_array()
        .ok_or_else(|| malformed("select must be an array"))?;

    // The `[['count']]` special case: a single nested `["count"]` entry.
    if arr.len() == 1 {
        if let Some(inner) = arr[0].as_array() {
            if inner.len() == 1 && inner[0].as_str() == Some("count") {
                return Ok(vec![SelectItem::CountStar]);
            }
        }
    }

    arr.iter().map(parse_select_item).collect()
}

fn parse_select_item(raw: &Json) -> QResult<SelectItem> {
    match raw {
        Json::String(name) => Ok(SelectItem::Column(name.clone())),
        Json::Array(parts) => {
            if parts.len() == 3 && parts[0].as_str() == Some("=") {
                let target = parts[1]
                    .as_str()
                    .ok_or_else(|| malformed("select alias target must be a string"))?
                    .to_string();
                if !is_valid_identifier(&target) {
                    return Err(malformed(format!("invalid select alias target '{target}'")));
                }
                let expr = parse_expr(&parts[2])?;
                Ok(SelectItem::Alias { target, expr })
            } else {
                Err(malformed(format!("invalid select item: {raw}")))
            }
        }
        other => Err(malformed(format!("invalid select item: {other}"))),
    }
}

pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_expr(raw: &Json) -> QResult<Expr> {
    match raw {
        Json::String(s) => Ok(Expr::Column(s.clone())),
        Json::Number(_) | Json::Bool(_) | Json::Null => Ok(Expr::Literal(Value::from_json(raw))),
        Json::Array(parts) => {
            if parts.is_empty() {
                return Err(malformed("empty expression"));
            }
            let op = parts[0]
                .as_str()
                .ok_or_else(|| malformed("expression operator must be a string"))?;

            if op == "count" && parts.len() == 1 {
                return Ok(Expr::CountStar);
            }

            if let Some(arith) = arith_op(op) {
                if parts.len() != 3 {
                    return Err(malformed(format!("'{op}' takes exactly two operands")));
                }
                return Ok(Expr::Arith(
                    arith,
                    Box::new(parse_expr(&parts[1])?),
                    Box::new(parse_expr(&parts[2])?),
                ));
            }
            if let Some(scalar) = scalar_fn(op) {
                if parts.len() != 2 {
                    return Err(malformed(format!("'{op}' takes exactly one operand")));
                }
                return Ok(Expr::Scalar(scalar, Box::new(parse_expr(&parts[1])?)));
            }
            if let Some(agg) = agg_fn(op) {
                if parts.len() != 2 {
                    return Err(malformed(format!("'{op}' takes exactly one operand")));
                }
                return Ok(Expr::Agg(agg, Box::new(parse_expr(&parts[1])?)));
            }

            Err(malformed(format!("unknown expression operator '{op}'")))
        }
        other => Err(malformed(format!("invalid expression: {other}"))),
    }
}

fn arith_op(op: &str) -> Option<ArithOp> {
    Some(match op {
        "+" => ArithOp::Add,
        "-" => ArithOp::Sub,
        "*" => ArithOp::Mul,
        "/" => ArithOp::Div,
        "%" => ArithOp::Mod,
        _ => return None,
    })
}

fn scalar_fn(op: &str) -> Option<ScalarFn> {
    Some(match op {
        "sqrt" => ScalarFn::Sqrt,
        "abs" => ScalarFn::Abs,
        "sin" => ScalarFn::Sin,
        "cos" => ScalarFn::Cos,
        "tan" => ScalarFn::Tan,
        "log" => ScalarFn::Log,
        "exp" => ScalarFn::Exp,
        _ => return None,
    })
}

fn agg_fn(op: &str) -> Option<AggFn> {
    Some(match op {
        "sum" => AggFn::Sum,
        "mean" => AggFn::Mean,
        "max" => AggFn::Max,
        "min" => AggFn::Min,
        "count" => AggFn::Count,
        "std" => AggFn::Std,
        "var" => AggFn::Var,
        _ => return None,
    })
}

pub fn parse_filter(raw: &Json) -> QResult<Filter> {
    let parts = raw
        .as_array()
        .ok_or_else(|| malformed(format!("filter must be an array: {raw}")))?;
    if parts.is_empty() {
        return Err(malformed("empty filter"));
    }
    let op = parts[0]
        .as_str()
        .ok_or_else(|| malformed("filter operator must be a string"))?;

    match op {
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            if parts.len() != 3 {
                return Err(malformed(format!("'{op}' takes exactly two operands")));
            }
            let column = parts[1]
                .as_str()
                .ok_or_else(|| malformed(format!("'{op}' column operand must be a string")))?
                .to_string();
            let arg = parse_filter_arg(&parts[2])?;
            let cmp = match op {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                ">=" => CmpOp::Ge,
                _ => unreachable!(),
            };
            Ok(Filter::Compare(cmp, column, arg))
        }
        "!" => {
            if parts.len() != 2 {
                return Err(malformed("'!' takes exactly one operand"));
            }
            Ok(Filter::Not(Box::new(parse_filter(&parts[1])?)))
        }
        "&" | "|" => {
            let operands = &parts[1..];
            if operands.is_empty() {
                return Err(malformed(format!("'{op}' requires at least one operand")));
            }
            let filters = operands.iter().map(parse_filter).collect::<QResult<Vec<_>>>()?;
            Ok(if op == "&" { Filter::And(filters) } else { Filter::Or(filters) })
        }
        "isnull" => {
            if parts.len() != 2 {
                return Err(malformed("'isnull' takes exactly one operand"));
            }
            let column = parts[1]
                .as_str()
                .ok_or_else(|| malformed("'isnull' operand must be a column name"))?
                .to_string();
            Ok(Filter::IsNull(column))
        }
        "in" => {
            if parts.len() != 3 {
                return Err(malformed("'in' takes exactly two operands"));
            }
            let column = parts[1]
                .as_str()
                .ok_or_else(|| malformed("'in' column operand must be a string"))?
                .to_string();
            let source = match &parts[2] {
                Json::Array(values) => {
                    InSource::Literal(values.iter().map(Value::from_json).collect())
                }
                Json::Object(_) => InSource::Subquery(Box::new(parse_query(&parts[2])?)),
                other => return Err(malformed(format!("invalid 'in' source: {other}"))),
            };
            Ok(Filter::In(column, source))
        }
        "like" | "ilike" => {
            if parts.len() != 3 {
                return Err(malformed(format!("'{op}' takes exactly two operands")));
            }
            let column = parts[1]
                .as_str()
                .ok_or_else(|| malformed(format!("'{op}' column operand must be a string")))?
                .to_string();
            let pattern = parts[2]
                .as_str()
                .ok_or_else(|| malformed(format!("'{op}' pattern must be a string")))?
                .to_string();
            Ok(Filter::Like { column, pattern, case_insensitive: op == "ilike" })
        }
        "any_bits" | "all_bits" => {
            if parts.len() != 3 {
                return Err(malformed(format!("'{op}' takes exactly two operands")));
            }
            let column = parts[1]
                .as_str()
                .ok_or_else(|| malformed(format!("'{op}' column operand must be a string")))?
                .to_string();
            let mask = parts[2]
                .as_i64()
                .ok_or_else(|| malformed(format!("'{op}' mask must be an integer")))?;
            Ok(if op == "any_bits" {
                Filter::AnyBits(column, mask)
            } else {
                Filter::AllBits(column, mask)
            })
        }
        other => Err(malformed(format!("unknown filter operator '{other}'"))),
    }
}

/// A comparison's right-hand side (§4.3.2): per the original source's
/// `_leaf_node`, a bare string is a column reference; a string quoted with
/// matching leading/trailing `'` or `"` is a literal with the quotes
/// stripped; anything else (number, bool, null) is a literal as-is.
fn parse_filter_arg(raw: &Json) -> QResult<FilterArg> {
    match raw {
        Json::String(s) if is_quoted(s) => {
            Ok(FilterArg::Literal(Value::Str(s[1..s.len() - 1].to_string())))
        }
        Json::String(s) => Ok(FilterArg::Column(s.clone())),
        other => Ok(FilterArg::Literal(Value::from_json(other))),
    }
}

pub(crate) fn is_quoted(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
}
