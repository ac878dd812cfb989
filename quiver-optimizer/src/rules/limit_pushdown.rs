//! Limit, Top-N, and sample pushdown. The storage-facing operators treat
//! their row cap as "at most N rows may leave"; the Limit node stays above
//! to enforce the exact count and offset.

use std::sync::Arc;

use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

/// Fuses `Limit <- Sort` into a single `TopN`, which keeps a bounded heap
/// instead of sorting everything.
pub struct TopNRule {
    pattern: Pattern,
}

impl TopNRule {
    pub fn new() -> Arc<Self> {
        Arc::new(TopNRule {
            pattern: Pattern::create(PlanKind::Limit, vec![Pattern::node(PlanKind::Sort)]),
        })
    }
}

impl OptRule for TopNRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let limit_gn = matched.node;
        let sort_gn = matched.dependencies[0].node;
        let limit_id = ctx.plan_id_of(limit_gn);
        let sort_id = ctx.plan_id_of(sort_gn);

        let (offset, count) = ctx
            .qctx()
            .plan_node(limit_id)
            .as_limit()
            .expect("pattern binds a limit");
        // The total input size is unknown, so Top-N can only absorb a
        // limit without an offset.
        if offset != 0 {
            return Ok(TransformResult::no_transform());
        }

        let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
        let sort_in = ctx.qctx().plan_node(sort_id).input_var(0).unwrap_or("").to_owned();
        let factors = ctx
            .qctx()
            .plan_node(sort_id)
            .as_sort_factors()
            .expect("pattern binds a sort")
            .to_vec();
        let sort_cols = ctx.qctx().col_names(sort_id).to_vec();

        let topn = ctx.qctx_mut().make_topn(None, factors, offset, count);
        ctx.qctx_mut().set_output_var(topn, &limit_out);
        ctx.qctx_mut().set_input_var(topn, &sort_in);
        ctx.qctx_mut().set_col_names(topn, sort_cols);

        let topn_gn = ctx.create_group_node(topn, ctx.group_of(limit_gn));
        let sort_deps = ctx.dependencies_of(sort_gn).to_vec();
        ctx.set_deps(topn_gn, &sort_deps);

        Ok(TransformResult::erase_all_with(vec![topn_gn]))
    }

    fn name(&self) -> &'static str {
        "TopNRule"
    }
}

/// `Limit <- scan-like` with a loose or absent row cap: set the cap to
/// `offset + count`, keep the Limit above.
fn push_limit_into_scan(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let limit_gn = matched.node;
    let scan_gn = matched.dependencies[0].node;
    let limit_id = ctx.plan_id_of(limit_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let (offset, count) = ctx
        .qctx()
        .plan_node(limit_id)
        .as_limit()
        .expect("pattern binds a limit");
    let limit_rows = offset + count;
    let scan_limit = ctx
        .qctx()
        .plan_node(scan_id)
        .scan_limit()
        .expect("pattern binds a capped operator");
    if scan_limit >= 0 && limit_rows >= scan_limit {
        return Ok(TransformResult::no_transform());
    }

    let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
    let new_limit = clone_with_output(ctx, limit_id, &limit_out);
    let new_limit_gn = ctx.create_group_node(new_limit, ctx.group_of(limit_gn));

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    ctx.qctx_mut().plan_node_mut(new_scan).set_scan_limit(limit_rows);
    let scan_group = ctx.create_group();
    let new_scan_gn = ctx.make_group_node(scan_group, new_scan);

    ctx.depends_on(new_limit_gn, scan_group);
    let new_scan_out = ctx.qctx().plan_node(new_scan).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_limit, &new_scan_out);
    let scan_deps = ctx.dependencies_of(scan_gn).to_vec();
    ctx.set_deps(new_scan_gn, &scan_deps);

    Ok(TransformResult::erase_all_with(vec![new_limit_gn]))
}

macro_rules! push_limit_down_rule {
    ($rule:ident, $name:literal, [$($kind:ident),+ $(,)?]) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Limit,
                        vec![Pattern::create_multi(vec![$(PlanKind::$kind),+], vec![])],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                push_limit_into_scan(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

push_limit_down_rule!(
    PushLimitDownGetNeighborsRule,
    "PushLimitDownGetNeighborsRule",
    [GetNeighbors]
);
push_limit_down_rule!(
    PushLimitDownGetVerticesRule,
    "PushLimitDownGetVerticesRule",
    [GetVertices]
);
push_limit_down_rule!(
    PushLimitDownGetEdgesRule,
    "PushLimitDownGetEdgesRule",
    [GetEdges]
);
push_limit_down_rule!(
    PushLimitDownScanEdgesRule,
    "PushLimitDownScanEdgesRule",
    [ScanEdges]
);
push_limit_down_rule!(
    PushLimitDownTraverseRule,
    "PushLimitDownTraverseRule",
    [Traverse]
);
push_limit_down_rule!(
    PushLimitDownExpandAllRule,
    "PushLimitDownExpandAllRule",
    [ExpandAll]
);
push_limit_down_rule!(
    PushLimitDownAllPathsRule,
    "PushLimitDownAllPathsRule",
    [AllPaths]
);
push_limit_down_rule!(
    PushLimitDownIndexScanRule,
    "PushLimitDownIndexScanRule",
    [IndexScan]
);
push_limit_down_rule!(
    PushLimitDownTagIndexFullScanRule,
    "PushLimitDownTagIndexFullScanRule",
    [TagIndexFullScan]
);
push_limit_down_rule!(
    PushLimitDownTagIndexPrefixScanRule,
    "PushLimitDownTagIndexPrefixScanRule",
    [TagIndexPrefixScan]
);
push_limit_down_rule!(
    PushLimitDownTagIndexRangeScanRule,
    "PushLimitDownTagIndexRangeScanRule",
    [TagIndexRangeScan]
);
push_limit_down_rule!(
    PushLimitDownEdgeIndexFullScanRule,
    "PushLimitDownEdgeIndexFullScanRule",
    [EdgeIndexFullScan]
);
push_limit_down_rule!(
    PushLimitDownEdgeIndexPrefixScanRule,
    "PushLimitDownEdgeIndexPrefixScanRule",
    [EdgeIndexPrefixScan]
);
push_limit_down_rule!(
    PushLimitDownEdgeIndexRangeScanRule,
    "PushLimitDownEdgeIndexRangeScanRule",
    [EdgeIndexRangeScan]
);

/// Swaps `Limit <- Project` into `Project <- Limit`; projecting after the
/// cut evaluates the expressions on fewer rows.
pub struct PushLimitDownProjectRule {
    pattern: Pattern,
}

impl PushLimitDownProjectRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushLimitDownProjectRule {
            pattern: Pattern::create(PlanKind::Limit, vec![Pattern::node(PlanKind::Project)]),
        })
    }
}

impl OptRule for PushLimitDownProjectRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let limit_gn = matched.node;
        let proj_gn = matched.dependencies[0].node;
        let limit_id = ctx.plan_id_of(limit_gn);
        let proj_id = ctx.plan_id_of(proj_gn);

        let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
        let proj_out = ctx.qctx().plan_node(proj_id).output_var().to_owned();
        let proj_in = ctx.qctx().plan_node(proj_id).input_var(0).unwrap_or("").to_owned();

        // The limit slides below and takes over the project's variable;
        // its columns become the project's input columns.
        let new_limit = clone_with_output(ctx, limit_id, &proj_out);
        ctx.qctx_mut().set_input_var(new_limit, &proj_in);
        let in_cols = ctx.qctx().var_col_names(&proj_in).to_vec();
        ctx.qctx_mut().set_col_names(new_limit, in_cols);
        let limit_group = ctx.create_group();
        let new_limit_gn = ctx.make_group_node(limit_group, new_limit);

        let new_proj = clone_with_output(ctx, proj_id, &limit_out);
        ctx.qctx_mut().set_input_var(new_proj, &proj_out);
        let new_proj_gn = ctx.create_group_node(new_proj, ctx.group_of(limit_gn));

        ctx.depends_on(new_proj_gn, limit_group);
        let proj_deps = ctx.dependencies_of(proj_gn).to_vec();
        ctx.set_deps(new_limit_gn, &proj_deps);

        Ok(TransformResult::erase_all_with(vec![new_proj_gn]))
    }

    fn name(&self) -> &'static str {
        "PushLimitDownProjectRule"
    }
}

/// Random-sample pushdown: the neighbor fetch can produce at most N rows,
/// drawn randomly, instead of materializing everything.
pub struct PushSampleDownGetNeighborsRule {
    pattern: Pattern,
}

impl PushSampleDownGetNeighborsRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushSampleDownGetNeighborsRule {
            pattern: Pattern::create(
                PlanKind::Sample,
                vec![Pattern::create(
                    PlanKind::Project,
                    vec![Pattern::node(PlanKind::GetNeighbors)],
                )],
            ),
        })
    }
}

impl OptRule for PushSampleDownGetNeighborsRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let sample_gn = matched.node;
        let proj_gn = matched.dependencies[0].node;
        let gn_gn = matched.dependencies[0].dependencies[0].node;
        let sample_id = ctx.plan_id_of(sample_gn);
        let proj_id = ctx.plan_id_of(proj_gn);
        let gn_id = ctx.plan_id_of(gn_gn);

        let sample_rows = match ctx.qctx().plan_node(sample_id).detail() {
            NodeDetail::Sample { count } => *count,
            _ => return Ok(TransformResult::no_transform()),
        };
        let gn_limit = ctx
            .qctx()
            .plan_node(gn_id)
            .scan_limit()
            .expect("pattern binds GetNeighbors");
        if gn_limit >= 0 && sample_rows >= gn_limit {
            return Ok(TransformResult::no_transform());
        }

        let sample_out = ctx.qctx().plan_node(sample_id).output_var().to_owned();
        let new_sample = clone_with_output(ctx, sample_id, &sample_out);
        let new_sample_gn = ctx.create_group_node(new_sample, ctx.group_of(sample_gn));

        let new_proj = ctx.qctx_mut().clone_plan_node(proj_id);
        let proj_group = ctx.create_group();
        let new_proj_gn = ctx.make_group_node(proj_group, new_proj);

        let new_gn = ctx.qctx_mut().clone_plan_node(gn_id);
        {
            let detail = ctx
                .qctx_mut()
                .plan_node_mut(new_gn)
                .as_get_neighbors_mut()
                .expect("clone keeps the kind");
            detail.limit = sample_rows;
            detail.random = true;
        }
        let gn_group = ctx.create_group();
        let new_gn_gn = ctx.make_group_node(gn_group, new_gn);

        ctx.depends_on(new_sample_gn, proj_group);
        ctx.depends_on(new_proj_gn, gn_group);
        let new_proj_out = ctx.qctx().plan_node(new_proj).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_sample, &new_proj_out);
        let new_gn_out = ctx.qctx().plan_node(new_gn).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_proj, &new_gn_out);
        let gn_deps = ctx.dependencies_of(gn_gn).to_vec();
        ctx.set_deps(new_gn_gn, &gn_deps);

        Ok(TransformResult::erase_all_with(vec![new_sample_gn]))
    }

    fn name(&self) -> &'static str {
        "PushSampleDownGetNeighborsRule"
    }
}

/// Embeds the limit into the BFS / multi-shortest-path operator inside the
/// collect loop; the DataCollect above is untouched.
pub struct PushLimitDownShortestPathRule {
    pattern: Pattern,
}

impl PushLimitDownShortestPathRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushLimitDownShortestPathRule {
            pattern: Pattern::create(
                PlanKind::Limit,
                vec![Pattern::create(
                    PlanKind::DataCollect,
                    vec![Pattern::create(
                        PlanKind::Loop,
                        vec![Pattern::create_multi(
                            vec![PlanKind::BfsShortest, PlanKind::MultiShortestPath],
                            vec![],
                        )],
                    )],
                )],
            ),
        })
    }
}

impl OptRule for PushLimitDownShortestPathRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let limit_gn = matched.node;
        let dc_gn = matched.dependencies[0].node;
        let loop_gn = matched.dependencies[0].dependencies[0].node;
        let path_gn = matched.dependencies[0].dependencies[0].dependencies[0].node;
        let limit_id = ctx.plan_id_of(limit_gn);
        let dc_id = ctx.plan_id_of(dc_gn);
        let loop_id = ctx.plan_id_of(loop_gn);
        let path_id = ctx.plan_id_of(path_gn);

        let (offset, count) = ctx
            .qctx()
            .plan_node(limit_id)
            .as_limit()
            .expect("pattern binds a limit");
        let limit_rows = offset + count;
        let path_limit = match ctx.qctx().plan_node(path_id).detail() {
            NodeDetail::BfsShortest { limit, .. } => *limit,
            NodeDetail::MultiShortestPath { limit, .. } => *limit,
            _ => return Ok(TransformResult::no_transform()),
        };
        if path_limit >= 0 && limit_rows >= path_limit {
            return Ok(TransformResult::no_transform());
        }

        let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
        let new_dc = clone_with_output(ctx, dc_id, &limit_out);
        let new_dc_gn = ctx.create_group_node(new_dc, ctx.group_of(limit_gn));

        let new_loop = ctx.qctx_mut().clone_plan_node(loop_id);
        let loop_group = ctx.create_group();
        let new_loop_gn = ctx.make_group_node(loop_group, new_loop);
        let loop_bodies = ctx.bodies_of(loop_gn).to_vec();
        for body in loop_bodies {
            ctx.add_body(new_loop_gn, body);
        }

        let new_path = ctx.qctx_mut().clone_plan_node(path_id);
        match ctx.qctx_mut().plan_node_mut(new_path).detail_mut() {
            NodeDetail::BfsShortest { limit, .. } => *limit = limit_rows,
            NodeDetail::MultiShortestPath { limit, .. } => *limit = limit_rows,
            _ => unreachable!("pattern restricts the kinds"),
        }
        let path_group = ctx.create_group();
        let new_path_gn = ctx.make_group_node(path_group, new_path);

        ctx.depends_on(new_dc_gn, loop_group);
        let new_loop_out = ctx.qctx().plan_node(new_loop).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_dc, &new_loop_out);
        ctx.depends_on(new_loop_gn, path_group);
        let new_path_out = ctx.qctx().plan_node(new_path).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_loop, &new_path_out);
        let path_deps = ctx.dependencies_of(path_gn).to_vec();
        ctx.set_deps(new_path_gn, &path_deps);

        Ok(TransformResult::erase_all_with(vec![new_dc_gn]))
    }

    fn name(&self) -> &'static str {
        "PushLimitDownShortestPathRule"
    }
}
