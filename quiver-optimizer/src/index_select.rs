//! Index selection: lowering a conjunctive filter into per-column seek
//! hints, ranking candidate indexes, and assembling the index query
//! contexts an `IndexScan` executes.

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;
use quiver_plan::expr::{Expr, ExprRef, LogicalOp, RelOp};
use quiver_plan::hints::{IndexColumnHint, IndexQueryContext, ScanKind};
use quiver_plan::meta::{ColumnDef, IndexItem, PropertyType, SchemaId};
use quiver_plan::Value;

use crate::error::{OptError, Result};
use crate::expr_rewrite::pull_ands;

/// One bounding condition on one column, extracted from a conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
    pub col_name: String,
    pub rel_op: RelOp,
    pub value: Value,
}

impl FilterItem {
    pub fn new(col_name: impl Into<String>, rel_op: RelOp, value: Value) -> Self {
        FilterItem {
            col_name: col_name.into(),
            rel_op,
            value,
        }
    }
}

/// Flatten a relational expression or conjunction of relational
/// expressions into filter items. `None` when any operand is not of the
/// `prop <op> constant` shape.
pub fn collect_filter_items(cond: &ExprRef) -> Option<Vec<FilterItem>> {
    fn item_of(e: &ExprRef) -> Option<FilterItem> {
        let Expr::Relational { op, left, right } = e.as_ref() else {
            return None;
        };
        if !matches!(
            op,
            RelOp::Eq | RelOp::Ne | RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge
        ) {
            return None;
        }
        let prop = match left.as_ref() {
            Expr::TagProp { prop, .. }
            | Expr::EdgeProp { prop, .. }
            | Expr::AliasTagProp { prop, .. } => prop.clone(),
            _ => return None,
        };
        let value = right.fold_constant()?;
        Some(FilterItem::new(prop, *op, value))
    }

    match pull_ands(cond).as_ref() {
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        } => operands.iter().map(item_of).collect(),
        _ => item_of(cond).map(|i| vec![i]),
    }
}

fn value_matches_column(value: &Value, col: &ColumnDef) -> bool {
    matches!(
        (value, col.prop_type),
        (Value::Bool(_), PropertyType::Bool)
            | (Value::Int(_), PropertyType::Int64)
            | (Value::Int(_), PropertyType::Timestamp)
            | (Value::Float(_), PropertyType::Double)
            | (Value::Str(_), PropertyType::String(_))
            | (Value::Geography(_), PropertyType::Geography(_))
    )
}

#[derive(Debug, Clone, PartialEq)]
struct Bound {
    value: Value,
    inclusive: bool,
}

/// Accumulate one comparator into the half-open bounds of a column. Range
/// comparators on BOOL are rejected; so are values of the wrong type.
fn bound_value(
    item: &FilterItem,
    col: &ColumnDef,
    begin: &mut Option<Bound>,
    end: &mut Option<Bound>,
) -> Result<()> {
    if !value_matches_column(&item.value, col) {
        return Err(OptError::SemanticError(format!(
            "value {:?} does not match the type of column `{}`",
            item.value, col.name
        )));
    }
    if col.prop_type == PropertyType::Bool && item.rel_op != RelOp::Eq {
        return Err(OptError::SemanticError(format!(
            "range scan over boolean column `{}` is invalid",
            col.name
        )));
    }

    let tighter_begin = |old: &Option<Bound>, new: Bound| -> Bound {
        match old {
            None => new,
            Some(old) => match new.value.partial_cmp_same_type(&old.value) {
                Some(std::cmp::Ordering::Greater) => new,
                Some(std::cmp::Ordering::Equal) if !new.inclusive => new,
                _ => old.clone(),
            },
        }
    };
    let tighter_end = |old: &Option<Bound>, new: Bound| -> Bound {
        match old {
            None => new,
            Some(old) => match new.value.partial_cmp_same_type(&old.value) {
                Some(std::cmp::Ordering::Less) => new,
                Some(std::cmp::Ordering::Equal) if !new.inclusive => new,
                _ => old.clone(),
            },
        }
    };

    match item.rel_op {
        RelOp::Gt => {
            *begin = Some(tighter_begin(
                begin,
                Bound {
                    value: item.value.clone(),
                    inclusive: false,
                },
            ));
        }
        RelOp::Ge => {
            *begin = Some(tighter_begin(
                begin,
                Bound {
                    value: item.value.clone(),
                    inclusive: true,
                },
            ));
        }
        RelOp::Lt => {
            *end = Some(tighter_end(
                end,
                Bound {
                    value: item.value.clone(),
                    inclusive: false,
                },
            ));
        }
        RelOp::Le => {
            *end = Some(tighter_end(
                end,
                Bound {
                    value: item.value.clone(),
                    inclusive: true,
                },
            ));
        }
        _ => {}
    }
    Ok(())
}

/// Convert the filter items of one column into a single hint: PREFIX when
/// an equality binds it, RANGE otherwise. Returns `Ok(None)` when nothing
/// bounding targets the column, which terminates the hint chain.
pub fn append_col_hint(
    hints: &mut Vec<IndexColumnHint>,
    items: &[FilterItem],
    col: &ColumnDef,
) -> Result<bool> {
    let col_items: Vec<&FilterItem> = items
        .iter()
        .filter(|i| i.col_name == col.name && i.rel_op.is_bounding())
        .collect();
    if col_items.is_empty() {
        return Ok(false);
    }

    if let Some(eq) = col_items.iter().find(|i| i.rel_op == RelOp::Eq) {
        if !value_matches_column(&eq.value, col) {
            return Err(OptError::SemanticError(format!(
                "value {:?} does not match the type of column `{}`",
                eq.value, col.name
            )));
        }
        // Contradictory equalities can never match a row; surface them
        // instead of emitting an unsatisfiable seek.
        if col_items
            .iter()
            .any(|i| i.rel_op == RelOp::Eq && i.value != eq.value)
        {
            return Err(OptError::SemanticError(format!(
                "contradictory equality conditions on column `{}`",
                col.name
            )));
        }
        hints.push(IndexColumnHint::prefix(col.name.clone(), eq.value.clone()));
        return Ok(true);
    }

    let mut begin: Option<Bound> = None;
    let mut end: Option<Bound> = None;
    for item in col_items {
        bound_value(item, col, &mut begin, &mut end)?;
    }
    hints.push(IndexColumnHint {
        column_name: col.name.clone(),
        scan_kind: ScanKind::Range,
        include_begin: begin.as_ref().map(|b| b.inclusive).unwrap_or(false),
        include_end: end.as_ref().map(|b| b.inclusive).unwrap_or(false),
        begin_value: begin.map(|b| b.value),
        end_value: end.map(|b| b.value),
    });
    Ok(true)
}

/// Assemble one query context against `index`: walk the index fields in
/// order, binding equality prefixes and at most one trailing range. The
/// optional `filter` is retained as the storage-side re-check.
pub fn append_index_query_ctx(
    index: &Arc<IndexItem>,
    items: &[FilterItem],
    out: &mut Vec<IndexQueryContext>,
    filter: Option<ExprRef>,
) -> Result<()> {
    let mut hints = Vec::new();
    for field in &index.fields {
        if !append_col_hint(&mut hints, items, field)? {
            break;
        }
        if hints
            .last()
            .map(|h| h.scan_kind == ScanKind::Range)
            .unwrap_or(false)
        {
            break;
        }
    }
    out.push(IndexQueryContext {
        index_id: Some(index.index_id),
        filter,
        column_hints: hints,
    });
    Ok(())
}

/// Whether the relational (or IN) expression's property is the first field
/// of any candidate index.
pub fn rel_expr_has_index(expr: &ExprRef, indexes: &[Arc<IndexItem>]) -> bool {
    let prop = match expr.as_ref() {
        Expr::Relational { left, .. } => match left.as_ref() {
            Expr::TagProp { prop, .. }
            | Expr::EdgeProp { prop, .. }
            | Expr::AliasTagProp { prop, .. } => prop.clone(),
            _ => return false,
        },
        _ => return false,
    };
    indexes
        .iter()
        .any(|i| i.fields.first().map(|f| f.name == prop).unwrap_or(false))
}

/// Drop indexes that do not cover this schema.
pub fn erase_invalid_index_items(schema_id: SchemaId, items: &mut Vec<Arc<IndexItem>>) {
    items.retain(|i| i.schema_id == schema_id);
}

/// Pick the best index for a conjunctive condition: rank by the number of
/// equality-bound prefix columns, then by whether the next column is
/// range-bound. `None` when the condition shape is unsupported or no index
/// binds anything.
pub fn find_optimal_index(
    cond: &ExprRef,
    indexes: &[Arc<IndexItem>],
    is_prefix_scan: &mut bool,
) -> Option<IndexQueryContext> {
    let items = collect_filter_items(cond)?;

    let score = |index: &Arc<IndexItem>| -> (usize, usize) {
        let mut eq_len = 0;
        for field in &index.fields {
            let has_eq = items
                .iter()
                .any(|i| i.col_name == field.name && i.rel_op == RelOp::Eq);
            if has_eq {
                eq_len += 1;
            } else {
                break;
            }
        }
        let range_bound = index
            .fields
            .get(eq_len)
            .map(|f| {
                items.iter().any(|i| {
                    i.col_name == f.name && i.rel_op.is_bounding() && i.rel_op != RelOp::Eq
                })
            })
            .unwrap_or(false);
        (eq_len, range_bound as usize)
    };

    let best = indexes
        .iter()
        .max_by_key(|i| score(i))
        .filter(|i| score(i) != (0, 0))?;

    let mut hints = Vec::new();
    for field in &best.fields {
        match append_col_hint(&mut hints, &items, field) {
            Ok(true) => {}
            _ => break,
        }
        if hints
            .last()
            .map(|h| h.scan_kind == ScanKind::Range)
            .unwrap_or(false)
        {
            break;
        }
    }
    if hints.is_empty() {
        return None;
    }

    // Anything the hints do not fully absorb stays as a re-check filter.
    let hinted: HashSet<&str> = hints.iter().map(|h| h.column_name.as_str()).collect();
    let fully_absorbed = items
        .iter()
        .all(|i| i.rel_op.is_bounding() && hinted.contains(i.col_name.as_str()));

    *is_prefix_scan = hints.iter().all(|h| h.scan_kind == ScanKind::Prefix);
    Some(IndexQueryContext {
        index_id: Some(best.index_id),
        filter: (!fully_absorbed).then(|| cond.clone()),
        column_hints: hints,
    })
}

/// The full selector behind `IndexScanRule`: no filter picks the cheapest
/// full scan, an OR fans out one context per operand, anything else goes
/// through [`find_optimal_index`].
pub fn create_index_query_ctx(
    filter: Option<&ExprRef>,
    indexes: &[Arc<IndexItem>],
) -> Result<Vec<IndexQueryContext>> {
    if indexes.is_empty() {
        return Err(OptError::IndexNotFound);
    }
    let Some(cond) = filter else {
        let cheapest = indexes
            .iter()
            .min_by_key(|i| i.fields.len())
            .expect("non-empty candidate list");
        return Ok(vec![IndexQueryContext {
            index_id: Some(cheapest.index_id),
            filter: None,
            column_hints: vec![],
        }]);
    };

    let mut out = Vec::new();
    match cond.as_ref() {
        Expr::Logical {
            op: LogicalOp::Or,
            operands,
        } => {
            for operand in operands {
                let mut prefix = false;
                let ictx = find_optimal_index(operand, indexes, &mut prefix)
                    .ok_or(OptError::IndexNotFound)?;
                out.push(ictx);
            }
        }
        _ => {
            let mut prefix = false;
            let ictx =
                find_optimal_index(cond, indexes, &mut prefix).ok_or(OptError::IndexNotFound)?;
            out.push(ictx);
        }
    }
    Ok(out)
}

/// Candidate indexes sorted cheapest-full-scan first (fewest fields).
pub fn cheapest_full_scan_index(indexes: &[Arc<IndexItem>]) -> Option<&Arc<IndexItem>> {
    indexes.iter().sorted_by_key(|i| i.fields.len()).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quiver_plan::meta::IndexParams;
    use test_case::test_case;

    fn int_col(name: &str) -> ColumnDef {
        ColumnDef::new(name, PropertyType::Int64)
    }

    fn index_with_cols(n: usize) -> Arc<IndexItem> {
        Arc::new(IndexItem {
            index_id: 1,
            index_name: "i".into(),
            schema_id: SchemaId::Tag(2),
            fields: (0..n).map(|i| int_col(&format!("col{i}"))).collect(),
            index_params: None,
        })
    }

    #[test]
    fn iqctx_empty_index_and_items() {
        let index = Arc::new(IndexItem {
            index_id: 1,
            index_name: "empty".into(),
            schema_id: SchemaId::Tag(2),
            fields: vec![],
            index_params: None,
        });
        let mut out = Vec::new();
        append_index_query_ctx(&index, &[], &mut out, None).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].column_hints.is_empty());
    }

    #[test]
    fn iqctx_upper_bounds_merge_to_tightest() {
        // col0 < 1 and col0 <= 6
        let items = vec![
            FilterItem::new("col0", RelOp::Lt, Value::Int(1)),
            FilterItem::new("col0", RelOp::Le, Value::Int(6)),
        ];
        let mut out = Vec::new();
        append_index_query_ctx(&index_with_cols(5), &items, &mut out, None).unwrap();

        assert_eq!(out.len(), 1);
        let ictx = &out[0];
        assert_eq!(ictx.index_id, Some(1));
        assert_eq!(ictx.filter, None);
        assert_eq!(ictx.column_hints.len(), 1);
        let hint = &ictx.column_hints[0];
        assert_eq!(hint.column_name, "col0");
        assert_eq!(hint.scan_kind, ScanKind::Range);
        assert_eq!(hint.end_value, Some(Value::Int(1)));
        assert!(!hint.include_end);
        assert_eq!(hint.begin_value, None);
    }

    #[test]
    fn iqctx_leading_range_terminates_chain() {
        // col0 > 1 and col1 <= 2 and col1 > -1 and col2 > 3 and col3 < 4
        // and col4 == 4
        let items = vec![
            FilterItem::new("col0", RelOp::Gt, Value::Int(1)),
            FilterItem::new("col1", RelOp::Le, Value::Int(2)),
            FilterItem::new("col1", RelOp::Gt, Value::Int(-1)),
            FilterItem::new("col2", RelOp::Gt, Value::Int(3)),
            FilterItem::new("col3", RelOp::Lt, Value::Int(4)),
            FilterItem::new("col4", RelOp::Eq, Value::Int(4)),
        ];
        let mut out = Vec::new();
        append_index_query_ctx(&index_with_cols(5), &items, &mut out, None).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].column_hints.len(), 1);
        let hint = &out[0].column_hints[0];
        assert_eq!(hint.column_name, "col0");
        assert_eq!(hint.scan_kind, ScanKind::Range);
        assert_eq!(hint.begin_value, Some(Value::Int(1)));
        assert!(!hint.include_begin);
        assert_eq!(hint.end_value, None);
    }

    #[test]
    fn iqctx_prefix_then_range_stops_at_unbounded_column() {
        // col0 == 1 and col1 <= 2 and col1 > -1 and col2 != 3 and col3 < 4;
        // col2 and col3 stay storage-side.
        let items = vec![
            FilterItem::new("col0", RelOp::Eq, Value::Int(1)),
            FilterItem::new("col1", RelOp::Le, Value::Int(2)),
            FilterItem::new("col1", RelOp::Gt, Value::Int(-1)),
            FilterItem::new("col2", RelOp::Ne, Value::Int(3)),
            FilterItem::new("col3", RelOp::Lt, Value::Int(4)),
        ];
        let mut out = Vec::new();
        append_index_query_ctx(&index_with_cols(5), &items, &mut out, None).unwrap();

        assert_eq!(out.len(), 1);
        let hints = &out[0].column_hints;
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].column_name, "col0");
        assert_eq!(hints[0].scan_kind, ScanKind::Prefix);
        assert_eq!(hints[0].begin_value, Some(Value::Int(1)));
        assert_eq!(hints[1].column_name, "col1");
        assert_eq!(hints[1].scan_kind, ScanKind::Range);
        assert_eq!(hints[1].begin_value, Some(Value::Int(-1)));
        assert!(!hints[1].include_begin);
        assert_eq!(hints[1].end_value, Some(Value::Int(2)));
        assert!(hints[1].include_end);
    }

    #[test]
    fn iqctx_three_prefixes_and_a_range_with_residual_filter() {
        // col0 == 1 and col1 == 2 and col2 == -1 and col3 > 3 and col4 < 4,
        // residual filter carries col4.
        let items = vec![
            FilterItem::new("col0", RelOp::Eq, Value::Int(1)),
            FilterItem::new("col1", RelOp::Eq, Value::Int(2)),
            FilterItem::new("col2", RelOp::Eq, Value::Int(-1)),
            FilterItem::new("col3", RelOp::Gt, Value::Int(3)),
            FilterItem::new("col4", RelOp::Lt, Value::Int(4)),
        ];
        let residual = Expr::lt(Expr::tag_prop("t", "col4"), Expr::constant(4i64));
        let mut out = Vec::new();
        append_index_query_ctx(&index_with_cols(5), &items, &mut out, Some(residual.clone()))
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filter, Some(residual));
        let hints = &out[0].column_hints;
        assert_eq!(hints.len(), 4);
        for (i, expected) in [(0, 1i64), (1, 2), (2, -1)] {
            assert_eq!(hints[i].column_name, format!("col{i}"));
            assert_eq!(hints[i].scan_kind, ScanKind::Prefix);
            assert_eq!(hints[i].begin_value, Some(Value::Int(expected)));
        }
        assert_eq!(hints[3].column_name, "col3");
        assert_eq!(hints[3].scan_kind, ScanKind::Range);
        assert_eq!(hints[3].begin_value, Some(Value::Int(3)));
        assert!(!hints[3].include_begin);
        assert_eq!(hints[3].end_value, None);
    }

    #[test_case(RelOp::Lt, None, false, Some(2), false; "lt open begin")]
    #[test_case(RelOp::Le, None, false, Some(2), true; "le includes end")]
    #[test_case(RelOp::Gt, Some(2), false, None, false; "gt excludes begin")]
    #[test_case(RelOp::Ge, Some(2), true, None, false; "ge includes begin")]
    fn single_comparator_int_bounds(
        op: RelOp,
        begin: Option<i64>,
        include_begin: bool,
        end: Option<i64>,
        include_end: bool,
    ) {
        let col = int_col("col_int");
        let items = vec![FilterItem::new("col_int", op, Value::Int(2))];
        let mut hints = Vec::new();
        append_col_hint(&mut hints, &items, &col).unwrap();
        assert_eq!(hints.len(), 1);
        let hint = &hints[0];
        assert_eq!(hint.scan_kind, ScanKind::Range);
        assert_eq!(hint.begin_value, begin.map(Value::Int));
        assert_eq!(hint.end_value, end.map(Value::Int));
        assert_eq!(hint.include_begin, include_begin);
        assert_eq!(hint.include_end, include_end);
    }

    #[test]
    fn closed_and_open_intervals() {
        let col = int_col("col_int");
        // col_int > 2 and col_int < 5
        let items = vec![
            FilterItem::new("col_int", RelOp::Gt, Value::Int(2)),
            FilterItem::new("col_int", RelOp::Lt, Value::Int(5)),
        ];
        let mut hints = Vec::new();
        append_col_hint(&mut hints, &items, &col).unwrap();
        let hint = &hints[0];
        assert_eq!(hint.begin_value, Some(Value::Int(2)));
        assert!(!hint.include_begin);
        assert_eq!(hint.end_value, Some(Value::Int(5)));
        assert!(!hint.include_end);

        // col_int >= 2 and col_int <= 5
        let items = vec![
            FilterItem::new("col_int", RelOp::Ge, Value::Int(2)),
            FilterItem::new("col_int", RelOp::Le, Value::Int(5)),
        ];
        let mut hints = Vec::new();
        append_col_hint(&mut hints, &items, &col).unwrap();
        let hint = &hints[0];
        assert_eq!(hint.begin_value, Some(Value::Int(2)));
        assert!(hint.include_begin);
        assert_eq!(hint.end_value, Some(Value::Int(5)));
        assert!(hint.include_end);
    }

    #[test]
    fn bool_range_scan_is_rejected() {
        let col = ColumnDef::new("col_bool", PropertyType::Bool);
        for op in [RelOp::Lt, RelOp::Ge] {
            let items = vec![FilterItem::new("col_bool", op, Value::Bool(true))];
            let mut hints = Vec::new();
            assert!(matches!(
                append_col_hint(&mut hints, &items, &col),
                Err(OptError::SemanticError(_))
            ));
        }
    }

    #[test]
    fn string_range_bounds() {
        let col = ColumnDef::new("col_str", PropertyType::String(10));
        // "aaa" <= col_str < "ccc"
        let items = vec![
            FilterItem::new("col_str", RelOp::Ge, Value::from("aaa")),
            FilterItem::new("col_str", RelOp::Lt, Value::from("ccc")),
        ];
        let mut hints = Vec::new();
        append_col_hint(&mut hints, &items, &col).unwrap();
        let hint = &hints[0];
        assert_eq!(hint.begin_value, Some(Value::from("aaa")));
        assert!(hint.include_begin);
        assert_eq!(hint.end_value, Some(Value::from("ccc")));
        assert!(!hint.include_end);
    }

    #[test]
    fn contradictory_equalities_are_semantic_errors() {
        let col = int_col("c");
        let items = vec![
            FilterItem::new("c", RelOp::Eq, Value::Int(1)),
            FilterItem::new("c", RelOp::Eq, Value::Int(2)),
        ];
        let mut hints = Vec::new();
        assert!(matches!(
            append_col_hint(&mut hints, &items, &col),
            Err(OptError::SemanticError(_))
        ));
    }

    #[test]
    fn optimal_index_prefers_longer_equality_prefix() {
        let i1 = Arc::new(IndexItem {
            index_id: 1,
            index_name: "i_p1".into(),
            schema_id: SchemaId::Tag(2),
            fields: vec![int_col("p1")],
            index_params: None,
        });
        let i2 = Arc::new(IndexItem {
            index_id: 2,
            index_name: "i_p1_p2".into(),
            schema_id: SchemaId::Tag(2),
            fields: vec![int_col("p1"), int_col("p2")],
            index_params: Some(IndexParams::default()),
        });
        let cond = Expr::and(
            Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(1i64)),
            Expr::eq(Expr::tag_prop("t", "p2"), Expr::constant(2i64)),
        );
        let mut prefix = false;
        let ictx = find_optimal_index(&cond, &[i1, i2], &mut prefix).unwrap();
        assert!(prefix);
        assert_eq!(ictx.index_id, Some(2));
        assert_eq!(ictx.column_hints.len(), 2);
        assert_eq!(ictx.filter, None);
    }

    #[test]
    fn unsupported_shape_yields_none() {
        let idx = index_with_cols(2);
        let cond = Expr::eq(Expr::input_prop("a"), Expr::constant(1i64));
        let mut prefix = false;
        assert!(find_optimal_index(&cond, &[idx], &mut prefix).is_none());
    }

    #[test]
    fn create_ctx_without_filter_picks_fewest_fields() {
        let wide = index_with_cols(4);
        let narrow = Arc::new(IndexItem {
            index_id: 9,
            index_name: "narrow".into(),
            schema_id: SchemaId::Tag(2),
            fields: vec![int_col("x")],
            index_params: None,
        });
        let ctxs = create_index_query_ctx(None, &[wide, narrow]).unwrap();
        assert_eq!(ctxs.len(), 1);
        assert_eq!(ctxs[0].index_id, Some(9));
    }

    #[test]
    fn create_ctx_or_filter_fans_out() {
        let idx = Arc::new(IndexItem {
            index_id: 5,
            index_name: "i_p1".into(),
            schema_id: SchemaId::Tag(2),
            fields: vec![int_col("p1")],
            index_params: None,
        });
        let cond = Expr::or(
            Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(1i64)),
            Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(2i64)),
        );
        let ctxs = create_index_query_ctx(Some(&cond), &[idx]).unwrap();
        assert_eq!(ctxs.len(), 2);
        assert!(ctxs.iter().all(|c| c.index_id == Some(5)));
    }
}
