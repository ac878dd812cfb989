//! Limit pushdown into fulltext and vector index scans, including the
//! two-level shape where the scan feeds a hash join against a
//! property-fetch branch rooted at an Argument.

use std::sync::Arc;

use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

fn scan_limits(detail: &NodeDetail) -> Option<(i64, i64)> {
    match detail {
        NodeDetail::FulltextIndexScan { limit, offset, .. } => Some((*limit, *offset)),
        NodeDetail::VectorIndexScan { limit, offset } => Some((*limit, *offset)),
        _ => None,
    }
}

fn set_scan_limits(detail: &mut NodeDetail, new_limit: i64, new_offset: i64) {
    match detail {
        NodeDetail::FulltextIndexScan { limit, offset, .. } => {
            *limit = new_limit;
            *offset = new_offset;
        }
        NodeDetail::VectorIndexScan { limit, offset } => {
            *limit = new_limit;
            *offset = new_offset;
        }
        _ => {}
    }
}

/// `Limit <- {Fulltext,Vector}IndexScan`: the scan serves `count + offset`
/// rows starting at `offset`; the Limit stays above for exactness.
fn push_limit_into_search_scan(
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

    let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
    let new_limit = clone_with_output(ctx, limit_id, &limit_out);
    let new_limit_gn = ctx.create_group_node(new_limit, ctx.group_of(limit_gn));

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    set_scan_limits(
        ctx.qctx_mut().plan_node_mut(new_scan).detail_mut(),
        count + offset,
        offset,
    );
    let scan_group = ctx.create_group();
    let new_scan_gn = ctx.make_group_node(scan_group, new_scan);

    ctx.depends_on(new_limit_gn, scan_group);
    let new_scan_out = ctx.qctx().plan_node(new_scan).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_limit, &new_scan_out);
    let scan_deps = ctx.dependencies_of(scan_gn).to_vec();
    ctx.set_deps(new_scan_gn, &scan_deps);

    Ok(TransformResult::erase_all_with(vec![new_limit_gn]))
}

/// The two-level variant: the scan joins against a property fetch over an
/// Argument; the whole matched chain is cloned so the embedded limit
/// cannot leak into the original candidates.
fn push_limit_through_join(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let limit_gn = matched.node;
    let join_gn = matched.dependencies[0].node;
    let scan_gn = matched.dependencies[0].dependencies[0].node;
    let explore_gn = matched.dependencies[0].dependencies[1].node;
    let arg_gn = matched.dependencies[0].dependencies[1].dependencies[0].node;

    let limit_id = ctx.plan_id_of(limit_gn);
    let join_id = ctx.plan_id_of(join_gn);
    let scan_id = ctx.plan_id_of(scan_gn);
    let explore_id = ctx.plan_id_of(explore_gn);
    let arg_id = ctx.plan_id_of(arg_gn);

    let (offset, count) = ctx
        .qctx()
        .plan_node(limit_id)
        .as_limit()
        .expect("pattern binds a limit");

    let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
    let new_limit = clone_with_output(ctx, limit_id, &limit_out);
    let new_limit_gn = ctx.create_group_node(new_limit, ctx.group_of(limit_gn));

    let new_join = ctx.qctx_mut().clone_plan_node(join_id);
    let join_group = ctx.create_group();
    let new_join_gn = ctx.make_group_node(join_group, new_join);
    ctx.depends_on(new_limit_gn, join_group);
    let new_join_out = ctx.qctx().plan_node(new_join).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_limit, &new_join_out);

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    set_scan_limits(
        ctx.qctx_mut().plan_node_mut(new_scan).detail_mut(),
        count + offset,
        offset,
    );
    let scan_group = ctx.create_group();
    let new_scan_gn = ctx.make_group_node(scan_group, new_scan);
    ctx.depends_on(new_join_gn, scan_group);
    let scan_deps = ctx.dependencies_of(scan_gn).to_vec();
    ctx.set_deps(new_scan_gn, &scan_deps);

    let new_explore = ctx.qctx_mut().clone_plan_node(explore_id);
    let explore_group = ctx.create_group();
    let new_explore_gn = ctx.make_group_node(explore_group, new_explore);
    ctx.depends_on(new_join_gn, explore_group);

    let new_scan_out = ctx.qctx().plan_node(new_scan).output_var().to_owned();
    let new_explore_out = ctx.qctx().plan_node(new_explore).output_var().to_owned();
    ctx.qctx_mut().set_input_var_at(new_join, 0, &new_scan_out);
    ctx.qctx_mut().set_input_var_at(new_join, 1, &new_explore_out);

    let new_arg = ctx.qctx_mut().clone_plan_node(arg_id);
    let arg_group = ctx.create_group();
    let new_arg_gn = ctx.make_group_node(arg_group, new_arg);
    ctx.depends_on(new_explore_gn, arg_group);
    let new_arg_out = ctx.qctx().plan_node(new_arg).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_explore, &new_arg_out);
    let arg_deps = ctx.dependencies_of(arg_gn).to_vec();
    ctx.set_deps(new_arg_gn, &arg_deps);

    Ok(TransformResult::erase_all_with(vec![new_limit_gn]))
}

fn limits_unset(ctx: &OptContext<'_>, matched: &MatchedResult, pos: &[usize]) -> bool {
    let scan_id = matched.plan_node(ctx, pos);
    scan_limits(ctx.qctx().plan_node(scan_id).detail())
        .map(|(limit, offset)| limit < 0 || offset < 0)
        .unwrap_or(false)
}

macro_rules! push_limit_down_search_rule {
    ($rule:ident, $name:literal, $kind:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Limit,
                        vec![Pattern::node(PlanKind::$kind)],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                default_match(ctx, matched) && limits_unset(ctx, matched, &[0, 0])
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                push_limit_into_search_scan(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

macro_rules! push_limit_through_join_rule {
    ($rule:ident, $name:literal, $kind:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Limit,
                        vec![Pattern::create(
                            PlanKind::HashInnerJoin,
                            vec![
                                Pattern::node(PlanKind::$kind),
                                Pattern::create_multi(
                                    vec![PlanKind::GetVertices, PlanKind::GetEdges],
                                    vec![Pattern::node(PlanKind::Argument)],
                                ),
                            ],
                        )],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            // The Argument branch reads its rows out of band, so the
            // default data-flow check would always refuse this shape.
            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                limits_unset(ctx, matched, &[0, 0, 0])
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                push_limit_through_join(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

push_limit_down_search_rule!(
    PushLimitDownFulltextIndexScanRule,
    "PushLimitDownFulltextIndexScanRule",
    FulltextIndexScan
);
push_limit_down_search_rule!(
    PushLimitDownVectorIndexScanRule,
    "PushLimitDownVectorIndexScanRule",
    VectorIndexScan
);
push_limit_through_join_rule!(
    PushLimitDownFulltextIndexScanRule2,
    "PushLimitDownFulltextIndexScanRule2",
    FulltextIndexScan
);
push_limit_through_join_rule!(
    PushLimitDownVectorIndexScanRule2,
    "PushLimitDownVectorIndexScanRule2",
    VectorIndexScan
);
