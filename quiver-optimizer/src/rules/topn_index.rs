//! Top-N pushdown into index scans: when every sort factor maps through
//! the projection onto a column the index can return, the scan itself can
//! emit the first `offset + count` rows in order.

use std::sync::Arc;

use quiver_plan::hints::OrderBy;
use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

fn ordered_scan_annotations(
    ctx: &OptContext<'_>,
    matched: &MatchedResult,
) -> Option<(i64, Vec<OrderBy>)> {
    let topn_id = matched.plan_node(ctx, &[0]);
    let proj_id = matched.plan_node(ctx, &[0, 0]);
    let scan_id = matched.plan_node(ctx, &[0, 0, 0]);

    let (factors, offset, count) = match ctx.qctx().plan_node(topn_id).detail() {
        NodeDetail::TopN {
            factors,
            offset,
            count,
        } => (factors.clone(), *offset, *count),
        _ => return None,
    };
    let scan = ctx.qctx().plan_node(scan_id).as_index_scan()?;

    let mut limit_rows = offset + count;
    if scan.limit >= 0 && limit_rows >= scan.limit {
        limit_rows = scan.limit;
    }

    let proj_cols = ctx.qctx().col_names(proj_id);
    let mut order_bys = Vec::with_capacity(factors.len());
    for factor in &factors {
        let col_name = proj_cols.get(factor.index)?;
        let return_col = scan.output_to_return.get(col_name)?;
        let pos = scan.return_columns.iter().position(|c| c == return_col)?;
        order_bys.push(OrderBy {
            pos,
            direction: factor.direction,
        });
    }
    Some((limit_rows, order_bys))
}

fn push_topn_into_index_scan(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let Some((limit_rows, order_bys)) = ordered_scan_annotations(ctx, matched) else {
        return Ok(TransformResult::no_transform());
    };

    let topn_gn = matched.node;
    let proj_gn = matched.dependencies[0].node;
    let scan_gn = matched.dependencies[0].dependencies[0].node;
    let topn_id = ctx.plan_id_of(topn_gn);
    let proj_id = ctx.plan_id_of(proj_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let topn_out = ctx.qctx().plan_node(topn_id).output_var().to_owned();
    let new_topn = clone_with_output(ctx, topn_id, &topn_out);
    let new_topn_gn = ctx.create_group_node(new_topn, ctx.group_of(topn_gn));

    let new_proj = ctx.qctx_mut().clone_plan_node(proj_id);
    let proj_group = ctx.create_group();
    let new_proj_gn = ctx.make_group_node(proj_group, new_proj);

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    {
        let detail = ctx
            .qctx_mut()
            .plan_node_mut(new_scan)
            .as_index_scan_mut()
            .expect("clone keeps the kind");
        detail.limit = limit_rows;
        detail.order_by = order_bys;
    }
    let scan_group = ctx.create_group();
    let new_scan_gn = ctx.make_group_node(scan_group, new_scan);

    ctx.depends_on(new_topn_gn, proj_group);
    let new_proj_out = ctx.qctx().plan_node(new_proj).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_topn, &new_proj_out);
    ctx.depends_on(new_proj_gn, scan_group);
    let new_scan_out = ctx.qctx().plan_node(new_scan).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_proj, &new_scan_out);
    let scan_deps = ctx.dependencies_of(scan_gn).to_vec();
    ctx.set_deps(new_scan_gn, &scan_deps);

    Ok(TransformResult::erase_all_with(vec![new_topn_gn]))
}

macro_rules! push_topn_down_rule {
    ($rule:ident, $name:literal, $kind:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::TopN,
                        vec![Pattern::create(
                            PlanKind::Project,
                            vec![Pattern::node(PlanKind::$kind)],
                        )],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                if !default_match(ctx, matched) {
                    return false;
                }
                let scan_id = matched.plan_node(ctx, &[0, 0, 0]);
                ctx.qctx()
                    .plan_node(scan_id)
                    .as_index_scan()
                    .map(|d| d.order_by.is_empty())
                    .unwrap_or(false)
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                push_topn_into_index_scan(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

push_topn_down_rule!(
    PushTopNDownTagIndexFullScanRule,
    "PushTopNDownTagIndexFullScanRule",
    TagIndexFullScan
);
push_topn_down_rule!(
    PushTopNDownTagIndexPrefixScanRule,
    "PushTopNDownTagIndexPrefixScanRule",
    TagIndexPrefixScan
);
push_topn_down_rule!(
    PushTopNDownTagIndexRangeScanRule,
    "PushTopNDownTagIndexRangeScanRule",
    TagIndexRangeScan
);
push_topn_down_rule!(
    PushTopNDownEdgeIndexFullScanRule,
    "PushTopNDownEdgeIndexFullScanRule",
    EdgeIndexFullScan
);
push_topn_down_rule!(
    PushTopNDownEdgeIndexPrefixScanRule,
    "PushTopNDownEdgeIndexPrefixScanRule",
    EdgeIndexPrefixScan
);
push_topn_down_rule!(
    PushTopNDownEdgeIndexRangeScanRule,
    "PushTopNDownEdgeIndexRangeScanRule",
    EdgeIndexRangeScan
);
