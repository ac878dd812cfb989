//! Dead-node elimination: constant-false filters, no-op vertex appends,
//! filter fusion, and filters that reference schemas which do not exist.

use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprKind};
use quiver_plan::{is_anon_var, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::expr_rewrite::collect_exprs;
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

/// Replaces a filter whose condition is constant `false` or `null` with an
/// empty constant dataset under a fresh start node.
///
/// Before:
///   Filter(false)
/// After:
///   ValueTable([]) <- Start
pub struct EliminateFilterRule {
    pattern: Pattern,
}

impl EliminateFilterRule {
    pub fn new() -> Arc<Self> {
        Arc::new(EliminateFilterRule {
            pattern: Pattern::node(PlanKind::Filter),
        })
    }
}

impl OptRule for EliminateFilterRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let filter = ctx.plan_of(matched.node);
        let condition = &filter.as_filter().expect("pattern binds a filter").condition;
        match condition.as_ref() {
            Expr::Constant(v) => {
                (v.is_implicit_bool() && v.as_bool() == Some(false)) || v.is_null()
            }
            _ => false,
        }
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
        let col_names = ctx.qctx().col_names(filter_id).to_vec();

        let new_start = ctx.qctx_mut().make_start();
        let start_group = ctx.create_group();
        ctx.make_group_node(start_group, new_start);

        let new_value = ctx.qctx_mut().make_value_table(Some(new_start), col_names);
        ctx.qctx_mut().set_output_var(new_value, &filter_out);
        let value_gn = ctx.create_group_node(new_value, ctx.group_of(filter_gn));
        ctx.depends_on(value_gn, start_group);

        Ok(TransformResult::erase_all_with(vec![value_gn]))
    }

    fn name(&self) -> &'static str {
        "EliminateFilterRule"
    }
}

/// Drops an `AppendVertices` that produces an anonymous, unfiltered node
/// alias no projection cares about.
///
/// Before:
///   Project <- AppendVertices
/// After:
///   Project
pub struct EliminateAppendVerticesRule {
    pattern: Pattern,
}

impl EliminateAppendVerticesRule {
    pub fn new() -> Arc<Self> {
        Arc::new(EliminateAppendVerticesRule {
            pattern: Pattern::create(
                PlanKind::Project,
                vec![Pattern::node(PlanKind::AppendVertices)],
            ),
        })
    }
}

impl OptRule for EliminateAppendVerticesRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let project_id = matched.plan_node(ctx, &[0]);
        let project = ctx.qctx().plan_node(project_id);
        let columns = &project.as_project().expect("pattern binds a project").columns;
        for col in columns {
            if quiver_plan::expr::find_any(&col.expr, &[ExprKind::PathBuild]).is_some() {
                return false;
            }
        }

        let av_id = matched.plan_node(ctx, &[0, 0]);
        let av = ctx.qctx().plan_node(av_id);
        let detail = av.as_append_vertices().expect("pattern binds append vertices");
        if detail.v_filter.is_some() || detail.filter.is_some() {
            return false;
        }
        // Only an anonymous node alias is droppable.
        ctx.qctx()
            .col_names(av_id)
            .last()
            .map(|alias| is_anon_var(alias))
            .unwrap_or(false)
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let project_gn = matched.node;
        let av_gn = matched.dependencies[0].node;
        let project_id = ctx.plan_id_of(project_gn);
        let av_id = ctx.plan_id_of(av_gn);

        let project_out = ctx.qctx().plan_node(project_id).output_var().to_owned();
        let av_input = ctx.qctx().plan_node(av_id).input_var(0).unwrap_or("").to_owned();

        let new_proj = clone_with_output(ctx, project_id, &project_out);
        ctx.qctx_mut().set_input_var(new_proj, &av_input);
        let new_proj_gn = ctx.create_group_node(new_proj, ctx.group_of(project_gn));
        let deps = ctx.dependencies_of(av_gn).to_vec();
        ctx.set_deps(new_proj_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_proj_gn]))
    }

    fn name(&self) -> &'static str {
        "EliminateAppendVerticesRule"
    }
}

/// Combines two stacked filters into one conjunction.
///
/// Before:
///   Filter(A) <- Filter(B)
/// After:
///   Filter(A AND B)
pub struct CombineFilterRule {
    pattern: Pattern,
}

impl CombineFilterRule {
    pub fn new() -> Arc<Self> {
        Arc::new(CombineFilterRule {
            pattern: Pattern::create(PlanKind::Filter, vec![Pattern::node(PlanKind::Filter)]),
        })
    }
}

impl OptRule for CombineFilterRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let upper_gn = matched.node;
        let lower_gn = matched.dependencies[0].node;
        let upper_id = ctx.plan_id_of(upper_gn);
        let lower_id = ctx.plan_id_of(lower_gn);

        let upper = ctx.qctx().plan_node(upper_id);
        let upper_out = upper.output_var().to_owned();
        let upper_cond = upper.as_filter().expect("pattern binds a filter").condition.clone();
        let lower = ctx.qctx().plan_node(lower_id);
        let lower_in = lower.input_var(0).unwrap_or("").to_owned();
        let lower_cond = lower.as_filter().expect("pattern binds a filter").condition.clone();

        let new_filter = clone_with_output(ctx, upper_id, &upper_out);
        ctx.qctx_mut()
            .plan_node_mut(new_filter)
            .as_filter_mut()
            .expect("clone keeps the kind")
            .condition = Expr::and(upper_cond, lower_cond);
        ctx.qctx_mut().set_input_var(new_filter, &lower_in);

        let new_gn = ctx.create_group_node(new_filter, ctx.group_of(upper_gn));
        let deps = ctx.dependencies_of(lower_gn).to_vec();
        ctx.set_deps(new_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "CombineFilterRule"
    }
}

/// A filter that can never pass, because it references a tag the space
/// does not have or was already marked always-false, sinks into the scan beneath
/// it (scans have an always-false fast path) or below its input otherwise.
pub struct InvalidFilterRule {
    pattern: Pattern,
}

impl InvalidFilterRule {
    pub fn new() -> Arc<Self> {
        Arc::new(InvalidFilterRule {
            pattern: Pattern::create(PlanKind::Filter, vec![Pattern::node(PlanKind::Unknown)]),
        })
    }

    fn is_always_false(ctx: &OptContext<'_>, condition: &quiver_plan::ExprRef) -> bool {
        let space = ctx.qctx().space();
        let tag_refs = collect_exprs(condition, &[ExprKind::AliasTagProp, ExprKind::TagProp]);
        tag_refs.iter().any(|e| {
            let tag = match e.as_ref() {
                Expr::AliasTagProp { tag, .. } | Expr::TagProp { tag, .. } => tag,
                _ => return false,
            };
            ctx.qctx().meta().tag_id(space, tag).is_none()
        })
    }
}

impl OptRule for InvalidFilterRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let filter = ctx.plan_of(matched.node);
        let detail = filter.as_filter().expect("pattern binds a filter");
        detail.always_false || Self::is_always_false(ctx, &detail.condition)
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let dep_gn = matched.dependencies[0].node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let dep_id = ctx.plan_id_of(dep_gn);

        let dep_kind = ctx.qctx().plan_node(dep_id).kind();
        if dep_kind.is_join() {
            return Ok(TransformResult::no_transform());
        }
        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();

        // Sinking stops once the dead filter sits directly above a source
        // or another dead filter.
        let dep = ctx.qctx().plan_node(dep_id);
        if !dep_kind.is_index_scan() && dep_kind != PlanKind::ScanVertices {
            if dep.num_deps() != 1 {
                return Ok(TransformResult::no_transform());
            }
            if dep.as_filter().map(|d| d.always_false).unwrap_or(false) {
                return Ok(TransformResult::no_transform());
            }
        }

        if dep_kind.is_index_scan() || dep_kind == PlanKind::ScanVertices {
            // Filter(false) <- Scan  =>  Scan(alwaysFalse)
            let new_dep = clone_with_output(ctx, dep_id, &filter_out);
            match ctx.qctx_mut().plan_node_mut(new_dep).detail_mut() {
                quiver_plan::NodeDetail::IndexScan(scan) => scan.always_false = true,
                quiver_plan::NodeDetail::ScanVertices(scan) => scan.always_false = true,
                _ => {}
            }
            let new_dep_gn = ctx.create_group_node(new_dep, ctx.group_of(filter_gn));
            let deps = ctx.dependencies_of(dep_gn).to_vec();
            ctx.set_deps(new_dep_gn, &deps);
            return Ok(TransformResult::erase_all_with(vec![new_dep_gn]));
        }

        // Filter(false) <- Dep  =>  Dep <- Filter(false), pinning the dead
        // predicate right above the source.
        let dep_in = ctx.qctx().plan_node(dep_id).input_var(0).unwrap_or("").to_owned();
        let new_filter = ctx.qctx_mut().clone_plan_node(filter_id);
        ctx.qctx_mut()
            .plan_node_mut(new_filter)
            .as_filter_mut()
            .expect("clone keeps the kind")
            .always_false = true;
        ctx.qctx_mut().set_input_var(new_filter, &dep_in);
        let dep_in_cols = ctx.qctx().var_col_names(&dep_in).to_vec();
        ctx.qctx_mut().set_col_names(new_filter, dep_in_cols);

        let new_filter_group = ctx.create_group();
        let new_filter_gn = ctx.make_group_node(new_filter_group, new_filter);

        let new_dep = clone_with_output(ctx, dep_id, &filter_out);
        let new_filter_out = ctx.qctx().plan_node(new_filter).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_dep, &new_filter_out);
        let new_dep_gn = ctx.create_group_node(new_dep, ctx.group_of(filter_gn));
        ctx.depends_on(new_dep_gn, new_filter_group);
        let deps = ctx.dependencies_of(dep_gn).to_vec();
        ctx.set_deps(new_filter_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_dep_gn]))
    }

    fn name(&self) -> &'static str {
        "InvalidFilterRule"
    }
}
