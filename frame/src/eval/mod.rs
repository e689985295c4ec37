pub mod filter;
pub mod select;
pub mod update;

use qcache_common::error::QResult;

use crate::ast::Query;
use crate::frame::QFrame;
use crate::value::Value;

/// Runs the full query pipeline (§4.3.2): `where -> group_by -> distinct ->
/// select -> order_by -> offset/limit`. Returns the resulting frame plus
/// the row count *before* `offset`/`limit` was applied (§6's
/// `X-QCache-unsliced-length`).
pub fn run_query<F>(query: &Query, frame: &QFrame, eval_subquery: &F) -> QResult<(QFrame, usize)>
where
    F: Fn(&Query) -> QResult<Vec<Value>>,
{
    let filtered = match &query.where_ {
        Some(f) => {
            let rows = filter::eval_filter(f, frame, eval_subquery)?;
            frame.take_rows(&rows)
        }
        None => frame.clone(),
    };

    let distinct = select::apply_distinct(&filtered, &query.distinct)?;

    let selected = if query.select.is_empty() {
        distinct
    } else {
        select::apply_select(&distinct, &query.group_by, &query.select)?
    };

    let ordered = select::apply_order_by(&selected, &query.order_by)?;
    let unsliced_length = ordered.row_count();
    let sliced = select::apply_offset_limit(&ordered, query.offset, query.limit);

    Ok((sliced, unsliced_length))
}
