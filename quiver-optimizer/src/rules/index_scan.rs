//! Index selection: the initial selector, the last-resort full scan, and
//! the filter-driven specialization into prefix/range scans.

use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprRef, LogicalOp, RelOp};
use quiver_plan::meta::IndexItem;
use quiver_plan::PlanKind;
use tracing::warn;

use crate::context::{OptContext, OptGroupNodeId};
use crate::error::{OptError, Result};
use crate::expr_rewrite::{container_operands, rewrite_in_expr};
use crate::index_select::{
    cheapest_full_scan_index, create_index_query_ctx, erase_invalid_index_items,
    find_optimal_index,
};
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};

/// Candidate indexes for the scan, filtered to its schema.
pub(crate) fn candidate_indexes(
    ctx: &OptContext<'_>,
    scan_id: quiver_plan::PlanNodeId,
) -> Vec<Arc<IndexItem>> {
    let scan = ctx.qctx().plan_node(scan_id);
    let Some(detail) = scan.as_index_scan() else {
        return vec![];
    };
    let mut items = if detail.is_edge {
        ctx.qctx().meta().edge_indexes(detail.space)
    } else {
        ctx.qctx().meta().tag_indexes(detail.space)
    };
    erase_invalid_index_items(detail.schema_id, &mut items);
    items
}

fn hints_unset(ctx: &OptContext<'_>, scan_id: quiver_plan::PlanNodeId) -> bool {
    ctx.qctx()
        .plan_node(scan_id)
        .as_index_scan()
        .map(|d| d.query_contexts.iter().all(|c| c.column_hints.is_empty()))
        .unwrap_or(false)
}

fn index_id_unset(ctx: &OptContext<'_>, scan_id: quiver_plan::PlanNodeId) -> bool {
    ctx.qctx()
        .plan_node(scan_id)
        .as_index_scan()
        .map(|d| d.query_contexts.iter().all(|c| c.index_id.is_none()))
        .unwrap_or(false)
}

/// Replace the matched filter-and-scan pair (or bare scan) with a fully
/// annotated scan in the filter's group, keeping the boundary groups.
pub(crate) fn install_scan_over_filter(
    ctx: &mut OptContext<'_>,
    root_gn: OptGroupNodeId,
    boundary_gn: OptGroupNodeId,
    new_scan: quiver_plan::PlanNodeId,
) -> OptGroupNodeId {
    let root_out = ctx.plan_of(root_gn).output_var().to_owned();
    let root_cols = ctx.qctx().col_names(ctx.plan_id_of(root_gn)).to_vec();
    ctx.qctx_mut().set_output_var(new_scan, &root_out);
    ctx.qctx_mut().set_col_names(new_scan, root_cols);
    let new_gn = ctx.create_group_node(new_scan, ctx.group_of(root_gn));
    let deps = ctx.dependencies_of(boundary_gn).to_vec();
    ctx.set_deps(new_gn, &deps);
    new_gn
}

/// The initial selector: consumes the filter the planner attached to a
/// bare `IndexScan` and populates its query contexts.
pub struct IndexScanRule {
    pattern: Pattern,
}

impl IndexScanRule {
    pub fn new() -> Arc<Self> {
        Arc::new(IndexScanRule {
            pattern: Pattern::node(PlanKind::IndexScan),
        })
    }

    fn attached_filter(ctx: &OptContext<'_>, scan_id: quiver_plan::PlanNodeId) -> Option<ExprRef> {
        let detail = ctx.qctx().plan_node(scan_id).as_index_scan()?;
        match detail.query_contexts.len() {
            0 => None,
            1 => detail.query_contexts[0].filter.clone(),
            n => {
                warn!(%scan_id, contexts = n, "unoptimized index scan carries multiple contexts");
                None
            }
        }
    }
}

impl OptRule for IndexScanRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        default_match(ctx, matched) && index_id_unset(ctx, ctx.plan_id_of(matched.node))
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let scan_gn = matched.node;
        let scan_id = ctx.plan_id_of(scan_gn);

        let filter = Self::attached_filter(ctx, scan_id);
        let indexes = candidate_indexes(ctx, scan_id);
        let contexts = create_index_query_ctx(filter.as_ref(), &indexes)?;

        if ctx.dependencies_of(scan_gn).len() != 1 {
            return Err(OptError::PlanError(format!(
                "index scan {scan_id} should have exactly one input"
            )));
        }

        let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
        ctx.qctx_mut()
            .plan_node_mut(new_scan)
            .as_index_scan_mut()
            .expect("clone keeps the kind")
            .query_contexts = contexts;
        let new_gn = install_scan_over_filter(ctx, scan_gn, scan_gn, new_scan);
        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "IndexScanRule"
    }
}

/// Last-resort full scan: no filter consumed anything, so pick the index
/// with the fewest fields, the cheapest one to sweep end to end.
fn full_scan_transform(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let scan_gn = matched.node;
    let scan_id = ctx.plan_id_of(scan_gn);

    let indexes = candidate_indexes(ctx, scan_id);
    let Some(cheapest) = cheapest_full_scan_index(&indexes) else {
        return Ok(TransformResult::no_transform());
    };
    let index_id = cheapest.index_id;

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    {
        let detail = ctx
            .qctx_mut()
            .plan_node_mut(new_scan)
            .as_index_scan_mut()
            .expect("clone keeps the kind");
        detail.query_contexts = vec![quiver_plan::hints::IndexQueryContext {
            index_id: Some(index_id),
            filter: None,
            column_hints: vec![],
        }];
    }
    let new_gn = install_scan_over_filter(ctx, scan_gn, scan_gn, new_scan);
    Ok(TransformResult::erase_curr_with(vec![new_gn]))
}

macro_rules! index_full_scan_rule {
    ($rule:ident, $name:literal, $kind:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::node(PlanKind::$kind),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                default_match(ctx, matched) && index_id_unset(ctx, ctx.plan_id_of(matched.node))
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                full_scan_transform(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

index_full_scan_rule!(TagIndexFullScanRule, "TagIndexFullScanRule", TagIndexFullScan);
index_full_scan_rule!(EdgeIndexFullScanRule, "EdgeIndexFullScanRule", EdgeIndexFullScan);

/// Filter-driven specialization of a full index scan into a prefix or
/// range scan, absorbing the filter into column hints.
///
/// Accepted conditions:
/// 1. A relational expression `prop <op> constant`. An IN whose container
///    has exactly one element counts (it rewrites to an equality); larger
///    containers belong to the union-scan rule.
/// 2. A logical AND of such expressions. An IN operand with a valid index
///    belongs to the union-scan rule and is refused here.
fn optimize_scan_by_filter(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
    prefix_kind: PlanKind,
    range_kind: PlanKind,
) -> Result<TransformResult> {
    let filter_gn = matched.node;
    let scan_gn = matched.dependencies[0].node;
    let filter_id = ctx.plan_id_of(filter_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let indexes = candidate_indexes(ctx, scan_id);
    let condition = ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();

    let transformed = match condition.as_ref() {
        Expr::Relational { op: RelOp::In, .. } => {
            let rewritten = rewrite_in_expr(&condition);
            if !rewritten.is_rel_expr() {
                return Ok(TransformResult::no_transform());
            }
            rewritten
        }
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        } => {
            let mut new_operands = Vec::with_capacity(operands.len());
            for operand in operands {
                if let Expr::Relational {
                    op: RelOp::In,
                    right,
                    ..
                } = operand.as_ref()
                {
                    let n = container_operands(right).map(|ops| ops.len()).unwrap_or(0);
                    if n > 1 {
                        return Ok(TransformResult::no_transform());
                    }
                    new_operands.push(rewrite_in_expr(operand));
                    continue;
                }
                new_operands.push(operand.clone());
            }
            Expr::and_all(new_operands)
        }
        _ => condition.clone(),
    };

    let mut is_prefix_scan = false;
    let Some(ictx) = find_optimal_index(&transformed, &indexes, &mut is_prefix_scan) else {
        return Ok(TransformResult::no_transform());
    };

    let new_kind = if is_prefix_scan { prefix_kind } else { range_kind };
    let new_scan = ctx.qctx_mut().clone_plan_node_with_kind(scan_id, new_kind);
    ctx.qctx_mut()
        .plan_node_mut(new_scan)
        .as_index_scan_mut()
        .expect("index kinds share the payload")
        .query_contexts = vec![ictx];

    let new_gn = install_scan_over_filter(ctx, filter_gn, scan_gn, new_scan);
    Ok(TransformResult::erase_curr_with(vec![new_gn]))
}

fn filter_over_full_scan_matches(
    ctx: &OptContext<'_>,
    matched: &MatchedResult,
    prop_matches: fn(&ExprRef) -> bool,
) -> bool {
    if !default_match(ctx, matched) {
        return false;
    }
    let scan_id = matched.plan_node(ctx, &[0, 0]);
    if !hints_unset(ctx, scan_id) {
        return false;
    }
    let filter_id = matched.plan_node(ctx, &[0]);
    let condition = &ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();

    match condition.as_ref() {
        Expr::Relational { op, left, right } => {
            if *op == RelOp::In {
                return container_operands(right)
                    .map(|ops| ops.len() == 1)
                    .unwrap_or(false);
            }
            prop_matches(left) && matches!(right.as_ref(), Expr::Constant(_))
        }
        Expr::Logical {
            op: LogicalOp::And, ..
        } => true,
        _ => false,
    }
}

macro_rules! optimize_index_scan_by_filter_rule {
    ($rule:ident, $name:literal, $full:ident, $prefix:ident, $range:ident, $prop_kind:pat) => {
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
                filter_over_full_scan_matches(ctx, matched, |left| {
                    matches!(left.as_ref(), $prop_kind)
                })
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                optimize_scan_by_filter(ctx, matched, PlanKind::$prefix, PlanKind::$range)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

optimize_index_scan_by_filter_rule!(
    OptimizeTagIndexScanByFilterRule,
    "OptimizeTagIndexScanByFilterRule",
    TagIndexFullScan,
    TagIndexPrefixScan,
    TagIndexRangeScan,
    Expr::TagProp { .. }
);
optimize_index_scan_by_filter_rule!(
    OptimizeEdgeIndexScanByFilterRule,
    "OptimizeEdgeIndexScanByFilterRule",
    EdgeIndexFullScan,
    EdgeIndexPrefixScan,
    EdgeIndexRangeScan,
    Expr::EdgeProp { .. }
);
