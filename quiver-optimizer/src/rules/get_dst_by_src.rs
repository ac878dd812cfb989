//! Subgraph vid-plumbing cleanup: when the collect below already yields a
//! distinct single-column vid set, the Dedup/Project pair feeding
//! `GetDstBySrc` is dead weight.

use std::sync::Arc;

use quiver_plan::expr::Expr;
use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::{clone_with_output, VID_COL};

/// Before:
///   GetDstBySrc($-._vid) <- Dedup <- Project <- DataCollect(distinct)
/// After:
///   GetDstBySrc(COLUMN[0]) <- DataCollect(distinct)
pub struct RemoveProjectDedupBeforeGetDstBySrcRule {
    pattern: Pattern,
}

impl RemoveProjectDedupBeforeGetDstBySrcRule {
    pub fn new() -> Arc<Self> {
        Arc::new(RemoveProjectDedupBeforeGetDstBySrcRule {
            pattern: Pattern::create(
                PlanKind::GetDstBySrc,
                vec![Pattern::create(
                    PlanKind::Dedup,
                    vec![Pattern::create(
                        PlanKind::Project,
                        vec![Pattern::node(PlanKind::DataCollect)],
                    )],
                )],
            ),
        })
    }
}

impl OptRule for RemoveProjectDedupBeforeGetDstBySrcRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        let gds_id = matched.plan_node(ctx, &[0]);
        let src_is_vid = match ctx.qctx().plan_node(gds_id).detail() {
            NodeDetail::GetDstBySrc { src, .. } => {
                matches!(src.as_ref(), Expr::InputProp(prop) if prop == VID_COL)
            }
            _ => false,
        };
        if !src_is_vid {
            return false;
        }

        let project_id = matched.plan_node(ctx, &[0, 0, 0]);
        let single_column = ctx
            .qctx()
            .plan_node(project_id)
            .as_project()
            .map(|d| d.columns.len() == 1)
            .unwrap_or(false);
        if !single_column {
            return false;
        }

        let dc_id = matched.plan_node(ctx, &[0, 0, 0, 0]);
        let distinct_vids = match ctx.qctx().plan_node(dc_id).detail() {
            NodeDetail::DataCollect {
                collect_kind,
                distinct,
            } => {
                *distinct
                    && matches!(collect_kind, quiver_plan::plan::DataCollectKind::MToN)
                    && ctx.qctx().col_names(dc_id).len() == 1
            }
            _ => false,
        };
        distinct_vids
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let gds_gn = matched.node;
        let project_gn = matched.dependencies[0].dependencies[0].node;
        let gds_id = ctx.plan_id_of(gds_gn);
        let project_id = ctx.plan_id_of(project_gn);

        let gds_out = ctx.qctx().plan_node(gds_id).output_var().to_owned();
        let project_in = ctx
            .qctx()
            .plan_node(project_id)
            .input_var(0)
            .unwrap_or("")
            .to_owned();

        let new_gds = clone_with_output(ctx, gds_id, &gds_out);
        match ctx.qctx_mut().plan_node_mut(new_gds).detail_mut() {
            NodeDetail::GetDstBySrc { src, .. } => *src = Expr::column(0),
            _ => unreachable!("pattern restricts the kind"),
        }
        ctx.qctx_mut().set_input_var(new_gds, &project_in);

        let new_gn = ctx.create_group_node(new_gds, ctx.group_of(gds_gn));
        let deps = ctx.dependencies_of(project_gn).to_vec();
        ctx.set_deps(new_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "RemoveProjectDedupBeforeGetDstBySrcRule"
    }
}
