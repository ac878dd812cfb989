//! Union index scans: an OR filter (or a shape reducible to one) above a
//! full index scan becomes a single `IndexScan` whose query contexts are
//! executed as a union, one per OR operand.

use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprRef, LogicalOp, RelOp};
use quiver_plan::{PlanKind, Value};

use crate::context::OptContext;
use crate::error::Result;
use crate::expr_rewrite::{container_operands, pull_ors, rewrite_and_over_or, rewrite_in_expr};
use crate::index_select::{find_optimal_index, rel_expr_has_index};
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::index_scan::{candidate_indexes, install_scan_over_filter};

fn contains_xor(expr: &ExprRef) -> bool {
    if matches!(
        expr.as_ref(),
        Expr::Logical {
            op: LogicalOp::Xor,
            ..
        }
    ) {
        return true;
    }
    expr.children().into_iter().any(contains_xor)
}

/// Accepts:
/// 1. an OR expression (possibly containing expandable IN operands),
/// 2. an AND containing an IN operand (distributes to an OR),
/// 3. a bare IN whose container has more than one element.
fn union_scan_matches(ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
    if !default_match(ctx, matched) {
        return false;
    }
    let scan_id = matched.plan_node(ctx, &[0, 0]);
    let hints_unset = ctx
        .qctx()
        .plan_node(scan_id)
        .as_index_scan()
        .map(|d| d.query_contexts.iter().all(|c| c.column_hints.is_empty()))
        .unwrap_or(false);
    if !hints_unset {
        return false;
    }

    let filter_id = matched.plan_node(ctx, &[0]);
    let condition = ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();

    if condition.is_logical_expr() {
        // XOR anywhere disqualifies the shape.
        if contains_xor(&condition) {
            return false;
        }
        match condition.as_ref() {
            Expr::Logical {
                op: LogicalOp::Or, ..
            } => return true,
            Expr::Logical {
                op: LogicalOp::And,
                operands,
            } => {
                return operands
                    .iter()
                    .any(|e| matches!(e.as_ref(), Expr::Relational { op: RelOp::In, .. }))
            }
            _ => return false,
        }
    }

    if let Expr::Relational {
        op: RelOp::In,
        right,
        ..
    } = condition.as_ref()
    {
        if let Some(operands) = container_operands(right) {
            return operands.len() > 1;
        }
        if let Expr::Constant(Value::List(items)) = right.as_ref() {
            return items.len() > 1;
        }
    }
    false
}

fn union_scan_transform(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let filter_gn = matched.node;
    let scan_gn = matched.dependencies[0].node;
    let filter_id = ctx.plan_id_of(filter_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let indexes = candidate_indexes(ctx, scan_id);
    if indexes.is_empty() {
        return Ok(TransformResult::no_transform());
    }

    let condition = ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();

    let transformed: ExprRef = match condition.as_ref() {
        // A bare IN over several elements expands to an OR when the
        // property has an index at all.
        Expr::Relational { op: RelOp::In, .. } => {
            if !rel_expr_has_index(&condition, &indexes) {
                return Ok(TransformResult::no_transform());
            }
            rewrite_in_expr(&condition)
        }
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        } => {
            let expanded: Vec<ExprRef> = operands
                .iter()
                .map(|e| {
                    if matches!(e.as_ref(), Expr::Relational { op: RelOp::In, .. })
                        && rel_expr_has_index(e, &indexes)
                    {
                        rewrite_in_expr(e)
                    } else {
                        e.clone()
                    }
                })
                .collect();
            let distributed = rewrite_and_over_or(&Expr::and_all(expanded));
            if !matches!(
                distributed.as_ref(),
                Expr::Logical {
                    op: LogicalOp::Or,
                    ..
                }
            ) {
                // Without an OR one scan suffices; that is the
                // specialize-by-filter rule's shape.
                return Ok(TransformResult::no_transform());
            }
            distributed
        }
        Expr::Logical {
            op: LogicalOp::Or,
            operands,
        } => {
            let expanded: Vec<ExprRef> = operands
                .iter()
                .map(|e| {
                    if matches!(e.as_ref(), Expr::Relational { op: RelOp::In, .. })
                        && rel_expr_has_index(e, &indexes)
                    {
                        rewrite_in_expr(e)
                    } else {
                        e.clone()
                    }
                })
                .collect();
            pull_ors(&Expr::or_all(expanded))
        }
        _ => return Ok(TransformResult::no_transform()),
    };

    let Expr::Logical {
        op: LogicalOp::Or,
        operands,
    } = transformed.as_ref()
    else {
        return Ok(TransformResult::no_transform());
    };

    let mut contexts = Vec::with_capacity(operands.len());
    for operand in operands {
        let mut is_prefix = false;
        let Some(ictx) = find_optimal_index(operand, &indexes, &mut is_prefix) else {
            return Ok(TransformResult::no_transform());
        };
        contexts.push(ictx);
    }

    let new_scan = ctx
        .qctx_mut()
        .clone_plan_node_with_kind(scan_id, PlanKind::IndexScan);
    ctx.qctx_mut()
        .plan_node_mut(new_scan)
        .as_index_scan_mut()
        .expect("index kinds share the payload")
        .query_contexts = contexts;

    let new_gn = install_scan_over_filter(ctx, filter_gn, scan_gn, new_scan);
    Ok(TransformResult::erase_curr_with(vec![new_gn]))
}

macro_rules! union_all_index_scan_rule {
    ($rule:ident, $name:literal, $full:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Filter,
                        vec![Pattern::node(PlanKind::$full)],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                union_scan_matches(ctx, matched)
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                union_scan_transform(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

union_all_index_scan_rule!(
    UnionAllTagIndexScanRule,
    "UnionAllTagIndexScanRule",
    TagIndexFullScan
);
union_all_index_scan_rule!(
    UnionAllEdgeIndexScanRule,
    "UnionAllEdgeIndexScanRule",
    EdgeIndexFullScan
);
