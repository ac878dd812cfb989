//! Join-input simplification: when a join keys on `id(v)` of a vertex
//! that `AppendVertices` only materializes for the key itself, the edge's
//! destination id serves directly and the append disappears.

use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprKind, ExprRef};
use quiver_plan::plan::YieldColumn;
use quiver_plan::{NodeDetail, PlanKind};

use crate::context::OptContext;
use crate::error::Result;
use crate::expr_rewrite::collect_exprs;
use crate::rule::{MatchedResult, OptRule, Pattern, TransformResult};

fn join_below_append_pattern(join_kinds: Vec<PlanKind>) -> Pattern {
    Pattern::create_multi(
        join_kinds,
        vec![
            Pattern::node(PlanKind::Unknown),
            Pattern::create(
                PlanKind::Project,
                vec![Pattern::create(
                    PlanKind::AppendVertices,
                    vec![Pattern::node(PlanKind::Traverse)],
                )],
            ),
        ],
    )
}

/// The probe-key position keyed as `id($-.alias)` or `_joinkey($-.alias)`,
/// provided the hash side carries the identical key. `None` when absent or
/// ambiguous.
fn probe_key_index(
    hash_keys: &[ExprRef],
    probe_keys: &[ExprRef],
    alias: &str,
) -> Option<usize> {
    let mut found = None;
    for (i, probe) in probe_keys.iter().enumerate() {
        let Expr::FunctionCall { name, args } = probe.as_ref() else {
            continue;
        };
        if name != "id" && name != "_joinkey" {
            continue;
        }
        let Some(Expr::InputProp(prop)) = args.first().map(|a| a.as_ref()) else {
            continue;
        };
        if prop != alias {
            continue;
        }
        if hash_keys.get(i) != Some(probe) {
            return None;
        }
        if found.is_some() {
            return None;
        }
        found = Some(i);
    }
    found
}

/// The single project column that forwards the alias. `None` when absent
/// or ambiguous.
fn alias_column_index(columns: &[YieldColumn], alias: &str) -> Option<usize> {
    let mut found = None;
    for (i, col) in columns.iter().enumerate() {
        if matches!(col.expr.as_ref(), Expr::InputProp(prop) if prop == alias) {
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
    }
    found
}

fn alias_referenced_more_than_once(exprs: &[ExprRef], alias: &str) -> bool {
    let mut refs = 0;
    for expr in exprs {
        for prop in collect_exprs(expr, &[ExprKind::VarProp, ExprKind::InputProp]) {
            if prop.prop_name() == Some(alias) {
                refs += 1;
            }
        }
    }
    refs > 1
}

/// Shared rewrite: replace the alias column with a `none_direct_dst` over
/// the traversed edge, rebuild the join against the plain alias column,
/// and drop the `AppendVertices`.
fn drop_append_below_join(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
    include_node_arg: bool,
) -> Result<TransformResult> {
    let join_gn = matched.node;
    let project_gn = matched.dependencies[1].node;
    let av_gn = matched.dependencies[1].dependencies[0].node;
    let tv_gn = matched.dependencies[1].dependencies[0].dependencies[0].node;

    let join_id = ctx.plan_id_of(join_gn);
    let project_id = ctx.plan_id_of(project_gn);
    let av_id = ctx.plan_id_of(av_gn);
    let tv_id = ctx.plan_id_of(tv_gn);

    let av_node_alias = ctx.qctx().col_names(av_id).last().cloned().unwrap_or_default();
    let tv_cols = ctx.qctx().col_names(tv_id).to_vec();
    if tv_cols.len() < 2 {
        return Ok(TransformResult::no_transform());
    }
    let tv_edge_alias = tv_cols[tv_cols.len() - 1].clone();
    let tv_node_alias = tv_cols[tv_cols.len() - 2].clone();

    let join = ctx.qctx().plan_node(join_id);
    let join_out = join.output_var().to_owned();
    let join_left_var = join.input_var(0).unwrap_or("").to_owned();
    let join_detail = join.as_join().expect("pattern binds a hash join").clone();

    if alias_referenced_more_than_once(&join_detail.probe_keys, &av_node_alias) {
        return Ok(TransformResult::no_transform());
    }
    let Some(key_idx) = probe_key_index(
        &join_detail.hash_keys,
        &join_detail.probe_keys,
        &av_node_alias,
    ) else {
        return Ok(TransformResult::no_transform());
    };

    let project = ctx.qctx().plan_node(project_id);
    let columns = project
        .as_project()
        .expect("pattern binds a project")
        .columns
        .clone();
    let column_exprs: Vec<ExprRef> = columns.iter().map(|c| c.expr.clone()).collect();
    if alias_referenced_more_than_once(&column_exprs, &av_node_alias) {
        return Ok(TransformResult::no_transform());
    }
    let Some(col_idx) = alias_column_index(&columns, &av_node_alias) else {
        return Ok(TransformResult::no_transform());
    };

    // The project now derives the alias from the edge's destination.
    let mut args = vec![Expr::input_prop(tv_edge_alias)];
    if include_node_arg {
        args.push(Expr::input_prop(tv_node_alias));
    }
    let dst_expr = Expr::function("none_direct_dst", args);
    let mut new_columns = columns;
    new_columns[col_idx] = YieldColumn::new(dst_expr, av_node_alias.clone());

    let av_input = ctx.qctx().plan_node(av_id).input_var(0).unwrap_or("").to_owned();
    let new_project = ctx.qctx_mut().make_project(None, new_columns);
    ctx.qctx_mut().set_input_var(new_project, &av_input);
    let project_group = ctx.create_group();
    let new_project_gn = ctx.make_group_node(project_group, new_project);
    let av_deps = ctx.dependencies_of(av_gn).to_vec();
    ctx.set_deps(new_project_gn, &av_deps);

    let new_join = ctx.qctx_mut().clone_plan_node(join_id);
    // Rewrite the probe key to the plain alias column.
    match ctx.qctx_mut().plan_node_mut(new_join).detail_mut() {
        NodeDetail::HashInnerJoin(detail) | NodeDetail::HashLeftJoin(detail) => {
            detail.probe_keys[key_idx] = Expr::input_prop(av_node_alias);
        }
        _ => unreachable!("pattern restricts the join kinds"),
    }
    ctx.qctx_mut().set_output_var(new_join, &join_out);
    ctx.qctx_mut().set_input_var_at(new_join, 0, &join_left_var);
    let new_project_out = ctx.qctx().plan_node(new_project).output_var().to_owned();
    ctx.qctx_mut().set_input_var_at(new_join, 1, &new_project_out);

    let new_join_gn = ctx.create_group_node(new_join, ctx.group_of(join_gn));
    let left_group = ctx.dependencies_of(join_gn)[0];
    ctx.depends_on(new_join_gn, left_group);
    ctx.depends_on(new_join_gn, project_group);

    Ok(TransformResult::erase_all_with(vec![new_join_gn]))
}

/// `Join(id(v), id(v)) <- Project <- AppendVertices(v) <- Traverse(e)`
/// where `v` is only a join key: consume the edge's destination directly.
pub struct RemoveAppendVerticesBelowJoinRule {
    pattern: Pattern,
}

impl RemoveAppendVerticesBelowJoinRule {
    pub fn new() -> Arc<Self> {
        Arc::new(RemoveAppendVerticesBelowJoinRule {
            pattern: join_below_append_pattern(vec![
                PlanKind::HashLeftJoin,
                PlanKind::HashInnerJoin,
            ]),
        })
    }
}

impl OptRule for RemoveAppendVerticesBelowJoinRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        drop_append_below_join(ctx, matched, true)
    }

    fn name(&self) -> &'static str {
        "RemoveAppendVerticesBelowJoinRule"
    }
}

/// The left-join-only variant, predating the generalized rule; it derives
/// the probe key from the edge alone.
pub struct OptimizeLeftJoinPredicateRule {
    pattern: Pattern,
}

impl OptimizeLeftJoinPredicateRule {
    pub fn new() -> Arc<Self> {
        Arc::new(OptimizeLeftJoinPredicateRule {
            pattern: join_below_append_pattern(vec![PlanKind::HashLeftJoin]),
        })
    }
}

impl OptRule for OptimizeLeftJoinPredicateRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        drop_append_below_join(ctx, matched, false)
    }

    fn name(&self) -> &'static str {
        "OptimizeLeftJoinPredicateRule"
    }
}
