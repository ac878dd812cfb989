//! Dedup absorption: the storage fetches can deduplicate their input ids
//! themselves, so an explicit Dedup below them is redundant.

use std::sync::Arc;

use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

fn merge_dedup_transform(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let fetch_gn = matched.node;
    let dedup_gn = matched.dependencies[0].node;
    let fetch_id = ctx.plan_id_of(fetch_gn);
    let dedup_id = ctx.plan_id_of(dedup_gn);

    let fetch_out = ctx.qctx().plan_node(fetch_id).output_var().to_owned();
    let dedup_in = ctx.qctx().plan_node(dedup_id).input_var(0).unwrap_or("").to_owned();

    let new_fetch = clone_with_output(ctx, fetch_id, &fetch_out);
    match ctx.qctx_mut().plan_node_mut(new_fetch).detail_mut() {
        NodeDetail::GetVertices(d) => d.dedup = true,
        NodeDetail::GetNeighbors(d) => d.dedup = true,
        _ => return Ok(TransformResult::no_transform()),
    }
    ctx.qctx_mut().set_input_var(new_fetch, &dedup_in);

    let new_gn = ctx.create_group_node(new_fetch, ctx.group_of(fetch_gn));
    let deps = ctx.dependencies_of(dedup_gn).to_vec();
    ctx.set_deps(new_gn, &deps);

    Ok(TransformResult::erase_all_with(vec![new_gn]))
}

macro_rules! merge_fetch_and_dedup_rule {
    ($rule:ident, $name:literal, $kind:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::$kind,
                        vec![Pattern::node(PlanKind::Dedup)],
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
                merge_dedup_transform(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

merge_fetch_and_dedup_rule!(
    MergeGetVerticesAndDedupRule,
    "MergeGetVerticesAndDedupRule",
    GetVertices
);
merge_fetch_and_dedup_rule!(
    MergeGetNbrsAndDedupRule,
    "MergeGetNbrsAndDedupRule",
    GetNeighbors
);
