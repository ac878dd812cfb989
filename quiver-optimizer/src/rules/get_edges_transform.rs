//! Whole-graph edge fetch: a one-step traversal over a full vertex scan
//! whose source is anonymous only exists to enumerate edges, so it becomes
//! a direct `ScanEdges` with a projection rebuilding the edge column.

use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprKind};
use quiver_plan::plan::{ScanEdgesDetail, YieldColumn};
use quiver_plan::{NodeDetail, PlanKind, PlanNodeId};

use crate::context::OptContext;
use crate::error::Result;
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};

/// Build the `ScanEdges` replacement for a traverse, or `None` when the
/// traverse needs both directions of an edge type (a flat edge scan cannot
/// pair them up).
fn traverse_to_scan_edges(
    ctx: &mut OptContext<'_>,
    tv_id: PlanNodeId,
    limit: i64,
) -> Option<PlanNodeId> {
    let tv = ctx.qctx().plan_node(tv_id).as_traverse()?.clone();
    if tv.edge_props.is_empty() {
        return None;
    }
    for (i, prop) in tv.edge_props.iter().enumerate() {
        for other in &tv.edge_props[i + 1..] {
            if prop.edge_type == -other.edge_type {
                return None;
            }
        }
    }
    let detail = ScanEdgesDetail {
        space: tv.space,
        edge_props: tv.edge_props.clone(),
        filter: tv.filter.clone(),
        dedup: tv.dedup,
        limit,
    };
    Some(ctx.qctx_mut().make_node(
        PlanKind::ScanEdges,
        NodeDetail::ScanEdges(detail),
        &[None],
    ))
}

/// A projection that rebuilds the traverse's edge-list column out of the
/// scanned edges.
fn project_edges(ctx: &mut OptContext<'_>, scan: PlanNodeId, col_name: &str) -> PlanNodeId {
    let columns = vec![YieldColumn::new(
        Expr::list(vec![Expr::edge_value()]),
        col_name,
    )];
    let proj = ctx.qctx_mut().make_project(None, columns);
    let scan_out = ctx.qctx().plan_node(scan).output_var().to_owned();
    ctx.qctx_mut().set_input_var(proj, &scan_out);
    proj
}

fn traverse_is_plain_edge_enumeration(ctx: &OptContext<'_>, tv_id: PlanNodeId) -> bool {
    let col_names = ctx.qctx().col_names(tv_id);
    if col_names.len() < 2 {
        return false;
    }
    // The source column must be anonymous: nothing downstream reads the
    // start vertices.
    if !col_names[col_names.len() - 2].starts_with('_') {
        return false;
    }
    ctx.qctx()
        .plan_node(tv_id)
        .as_traverse()
        .map(|d| d.step_range.is_none())
        .unwrap_or(false)
}

fn project_builds_no_path(ctx: &OptContext<'_>, project_id: PlanNodeId) -> bool {
    let Some(detail) = ctx.qctx().plan_node(project_id).as_project() else {
        return false;
    };
    detail.columns.iter().all(|col| {
        quiver_plan::expr::find_any(&col.expr, &[ExprKind::PathBuild]).is_none()
    })
}

/// Before:
///   AppendVertices <- Traverse(1 step) <- ScanVertices
/// After:
///   AppendVertices <- Project(edges) <- ScanEdges
pub struct GetEdgesTransformRule {
    pattern: Pattern,
}

impl GetEdgesTransformRule {
    pub fn new() -> Arc<Self> {
        Arc::new(GetEdgesTransformRule {
            pattern: Pattern::create(
                PlanKind::AppendVertices,
                vec![Pattern::create(
                    PlanKind::Traverse,
                    vec![Pattern::node(PlanKind::ScanVertices)],
                )],
            ),
        })
    }
}

impl OptRule for GetEdgesTransformRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        default_match(ctx, matched)
            && traverse_is_plain_edge_enumeration(ctx, matched.plan_node(ctx, &[0, 0]))
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let av_gn = matched.node;
        let tv_gn = matched.dependencies[0].node;
        let sv_gn = matched.dependencies[0].dependencies[0].node;
        let av_id = ctx.plan_id_of(av_gn);
        let tv_id = ctx.plan_id_of(tv_gn);

        let tv_limit = ctx
            .qctx()
            .plan_node(tv_id)
            .scan_limit()
            .expect("pattern binds a traverse");
        let Some(new_scan_edges) = traverse_to_scan_edges(ctx, tv_id, tv_limit) else {
            return Ok(TransformResult::no_transform());
        };

        let av_cols = ctx.qctx().col_names(av_id).to_vec();
        let av_out = ctx.qctx().plan_node(av_id).output_var().to_owned();
        let tv_out = ctx.qctx().plan_node(tv_id).output_var().to_owned();
        let edge_col = ctx.qctx().col_names(tv_id).last().cloned().unwrap_or_default();

        let new_av = ctx.qctx_mut().clone_plan_node(av_id);
        ctx.qctx_mut().set_output_var(new_av, &av_out);
        let n = av_cols.len();
        ctx.qctx_mut()
            .set_col_names(new_av, vec![av_cols[n - 2].clone(), av_cols[n - 1].clone()]);
        let new_av_gn = ctx.create_group_node(new_av, ctx.group_of(av_gn));

        let scan_group = ctx.create_group();
        let scan_gn = ctx.make_group_node(scan_group, new_scan_edges);

        let new_proj = project_edges(ctx, new_scan_edges, &edge_col);
        // The projection takes over the traverse's variable so the append
        // above keeps its input untouched.
        ctx.qctx_mut().set_output_var(new_proj, &tv_out);
        ctx.qctx_mut().set_col_names(new_proj, vec![edge_col]);
        let proj_group = ctx.create_group();
        let proj_gn = ctx.make_group_node(proj_group, new_proj);

        ctx.depends_on(new_av_gn, proj_group);
        ctx.depends_on(proj_gn, scan_group);
        let sv_deps = ctx.dependencies_of(sv_gn).to_vec();
        ctx.set_deps(scan_gn, &sv_deps);
        crate::rules::align_input_vars(ctx, scan_gn);

        Ok(TransformResult::erase_curr_with(vec![new_av_gn]))
    }

    fn name(&self) -> &'static str {
        "GetEdgesTransformRule"
    }
}

/// Before:
///   Project <- Limit <- Traverse(1 step) <- ScanVertices
/// After:
///   Project <- Limit <- Project(edges) <- ScanEdges(limit)
pub struct GetEdgesTransformLimitRule {
    pattern: Pattern,
}

impl GetEdgesTransformLimitRule {
    pub fn new() -> Arc<Self> {
        Arc::new(GetEdgesTransformLimitRule {
            pattern: Pattern::create(
                PlanKind::Project,
                vec![Pattern::create(
                    PlanKind::Limit,
                    vec![Pattern::create(
                        PlanKind::Traverse,
                        vec![Pattern::node(PlanKind::ScanVertices)],
                    )],
                )],
            ),
        })
    }
}

impl OptRule for GetEdgesTransformLimitRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        default_match(ctx, matched)
            && traverse_is_plain_edge_enumeration(ctx, matched.plan_node(ctx, &[0, 0, 0]))
            && project_builds_no_path(ctx, matched.plan_node(ctx, &[0]))
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let project_gn = matched.node;
        let limit_gn = matched.dependencies[0].node;
        let tv_gn = matched.dependencies[0].dependencies[0].node;
        let sv_gn = matched.dependencies[0].dependencies[0].dependencies[0].node;
        let project_id = ctx.plan_id_of(project_gn);
        let limit_id = ctx.plan_id_of(limit_gn);
        let tv_id = ctx.plan_id_of(tv_gn);

        let (offset, count) = ctx
            .qctx()
            .plan_node(limit_id)
            .as_limit()
            .expect("pattern binds a limit");
        let Some(new_scan_edges) = traverse_to_scan_edges(ctx, tv_id, offset + count) else {
            return Ok(TransformResult::no_transform());
        };

        let project_out = ctx.qctx().plan_node(project_id).output_var().to_owned();
        let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
        let tv_out = ctx.qctx().plan_node(tv_id).output_var().to_owned();
        let edge_col = ctx.qctx().col_names(tv_id).last().cloned().unwrap_or_default();

        let new_project = ctx.qctx_mut().clone_plan_node(project_id);
        ctx.qctx_mut().set_output_var(new_project, &project_out);
        let new_project_gn = ctx.create_group_node(new_project, ctx.group_of(project_gn));

        let new_limit = ctx.qctx_mut().clone_plan_node(limit_id);
        ctx.qctx_mut().set_output_var(new_limit, &limit_out);
        let limit_group = ctx.create_group();
        let new_limit_gn = ctx.make_group_node(limit_group, new_limit);
        ctx.depends_on(new_project_gn, limit_group);

        let scan_group = ctx.create_group();
        let scan_gn = ctx.make_group_node(scan_group, new_scan_edges);

        let new_proj_edges = project_edges(ctx, new_scan_edges, &edge_col);
        ctx.qctx_mut().set_output_var(new_proj_edges, &tv_out);
        ctx.qctx_mut().set_col_names(new_proj_edges, vec![edge_col]);
        let proj_edges_group = ctx.create_group();
        let proj_edges_gn = ctx.make_group_node(proj_edges_group, new_proj_edges);

        ctx.depends_on(new_limit_gn, proj_edges_group);
        ctx.qctx_mut().set_input_var(new_limit, &tv_out);
        ctx.depends_on(proj_edges_gn, scan_group);
        let sv_deps = ctx.dependencies_of(sv_gn).to_vec();
        ctx.set_deps(scan_gn, &sv_deps);
        crate::rules::align_input_vars(ctx, scan_gn);

        Ok(TransformResult::erase_all_with(vec![new_project_gn]))
    }

    fn name(&self) -> &'static str {
        "GetEdgesTransformLimitRule"
    }
}

/// Before:
///   Project <- Limit <- AppendVertices <- Traverse(1 step) <- ScanVertices
/// After:
///   Project <- Limit <- AppendVertices <- Project(edges) <- ScanEdges(limit)
pub struct GetEdgesTransformAppendVerticesLimitRule {
    pattern: Pattern,
}

impl GetEdgesTransformAppendVerticesLimitRule {
    pub fn new() -> Arc<Self> {
        Arc::new(GetEdgesTransformAppendVerticesLimitRule {
            pattern: Pattern::create(
                PlanKind::Project,
                vec![Pattern::create(
                    PlanKind::Limit,
                    vec![Pattern::create(
                        PlanKind::AppendVertices,
                        vec![Pattern::create(
                            PlanKind::Traverse,
                            vec![Pattern::node(PlanKind::ScanVertices)],
                        )],
                    )],
                )],
            ),
        })
    }
}

impl OptRule for GetEdgesTransformAppendVerticesLimitRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        default_match(ctx, matched)
            && traverse_is_plain_edge_enumeration(ctx, matched.plan_node(ctx, &[0, 0, 0, 0]))
            && project_builds_no_path(ctx, matched.plan_node(ctx, &[0]))
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let project_gn = matched.node;
        let limit_gn = matched.dependencies[0].node;
        let av_gn = matched.dependencies[0].dependencies[0].node;
        let tv_gn = matched.dependencies[0].dependencies[0].dependencies[0].node;
        let sv_gn = matched.dependencies[0].dependencies[0].dependencies[0].dependencies[0].node;
        let project_id = ctx.plan_id_of(project_gn);
        let limit_id = ctx.plan_id_of(limit_gn);
        let av_id = ctx.plan_id_of(av_gn);
        let tv_id = ctx.plan_id_of(tv_gn);

        let (offset, count) = ctx
            .qctx()
            .plan_node(limit_id)
            .as_limit()
            .expect("pattern binds a limit");
        let Some(new_scan_edges) = traverse_to_scan_edges(ctx, tv_id, offset + count) else {
            return Ok(TransformResult::no_transform());
        };

        let project_out = ctx.qctx().plan_node(project_id).output_var().to_owned();
        let limit_out = ctx.qctx().plan_node(limit_id).output_var().to_owned();
        let av_cols = ctx.qctx().col_names(av_id).to_vec();
        let edge_col = ctx.qctx().col_names(tv_id).last().cloned().unwrap_or_default();

        let new_project = ctx.qctx_mut().clone_plan_node(project_id);
        ctx.qctx_mut().set_output_var(new_project, &project_out);
        let new_project_gn = ctx.create_group_node(new_project, ctx.group_of(project_gn));

        let new_limit = ctx.qctx_mut().clone_plan_node(limit_id);
        ctx.qctx_mut().set_output_var(new_limit, &limit_out);
        let limit_group = ctx.create_group();
        let new_limit_gn = ctx.make_group_node(limit_group, new_limit);
        ctx.depends_on(new_project_gn, limit_group);

        let new_av = ctx.qctx_mut().clone_plan_node(av_id);
        let av_group = ctx.create_group();
        let new_av_out = ctx.qctx().plan_node(new_av).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_limit, &new_av_out);
        // Limit keeps the full column set; the trimmed append only feeds
        // the final projection the two columns it still produces.
        ctx.qctx_mut().set_col_names(new_limit, av_cols.clone());
        let n = av_cols.len();
        let new_av_gn = ctx.make_group_node(av_group, new_av);
        ctx.qctx_mut()
            .set_col_names(new_av, vec![av_cols[n - 2].clone(), av_cols[n - 1].clone()]);
        ctx.depends_on(new_limit_gn, av_group);

        let scan_group = ctx.create_group();
        let scan_gn = ctx.make_group_node(scan_group, new_scan_edges);

        let new_proj_edges = project_edges(ctx, new_scan_edges, &edge_col);
        ctx.qctx_mut().set_col_names(new_proj_edges, vec![edge_col]);
        let proj_edges_group = ctx.create_group();
        let proj_edges_gn = ctx.make_group_node(proj_edges_group, new_proj_edges);

        ctx.depends_on(new_av_gn, proj_edges_group);
        let proj_edges_out = ctx.qctx().plan_node(new_proj_edges).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_av, &proj_edges_out);
        ctx.depends_on(proj_edges_gn, scan_group);
        let sv_deps = ctx.dependencies_of(sv_gn).to_vec();
        ctx.set_deps(scan_gn, &sv_deps);
        crate::rules::align_input_vars(ctx, scan_gn);

        Ok(TransformResult::erase_all_with(vec![new_project_gn]))
    }

    fn name(&self) -> &'static str {
        "GetEdgesTransformAppendVerticesLimitRule"
    }
}
