//! Projection simplification: removing pass-through projects and merging
//! stacked projects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quiver_plan::expr::{ExprKind, ExprRef};
use quiver_plan::plan::YieldColumn;
use quiver_plan::PlanKind;

use crate::context::OptContext;
use crate::error::Result;
use crate::expr_rewrite::{collect_exprs, rewrite_expr};
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::clone_with_output;

/// Kinds whose output a pass-through project can take over directly.
const PASSTHROUGH_INPUTS: &[PlanKind] = &[
    PlanKind::GetNeighbors,
    PlanKind::GetVertices,
    PlanKind::GetEdges,
    PlanKind::Traverse,
    PlanKind::AppendVertices,
    PlanKind::IndexScan,
    PlanKind::TagIndexFullScan,
    PlanKind::TagIndexPrefixScan,
    PlanKind::TagIndexRangeScan,
    PlanKind::EdgeIndexFullScan,
    PlanKind::EdgeIndexPrefixScan,
    PlanKind::EdgeIndexRangeScan,
    PlanKind::ScanVertices,
    PlanKind::ScanEdges,
    PlanKind::Project,
    PlanKind::Sort,
    PlanKind::TopN,
    PlanKind::Sample,
    PlanKind::DataCollect,
    PlanKind::HashInnerJoin,
    PlanKind::HashLeftJoin,
    PlanKind::CrossJoin,
    PlanKind::BfsShortest,
    PlanKind::MultiShortestPath,
    PlanKind::AllPaths,
    PlanKind::ExpandAll,
    PlanKind::GetDstBySrc,
    PlanKind::Argument,
];

/// Removes a project that renames nothing: every column is a plain
/// property reference matching the child's column of the same position.
pub struct RemoveNoopProjectRule {
    pattern: Pattern,
}

impl RemoveNoopProjectRule {
    pub fn new() -> Arc<Self> {
        Arc::new(RemoveNoopProjectRule {
            pattern: Pattern::create(
                PlanKind::Project,
                vec![Pattern::create_multi(PASSTHROUGH_INPUTS.to_vec(), vec![])],
            ),
        })
    }
}

impl OptRule for RemoveNoopProjectRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let proj_id = matched.plan_node(ctx, &[0]);
        let proj = ctx.qctx().plan_node(proj_id);
        let columns = &proj.as_project().expect("pattern binds a project").columns;
        for col in columns {
            if !matches!(
                col.expr.kind(),
                ExprKind::VarProp | ExprKind::InputProp
            ) {
                return false;
            }
        }

        let dep_id = matched.plan_node(ctx, &[0, 0]);
        let dep_cols = ctx.qctx().col_names(dep_id);
        let proj_cols = ctx.qctx().col_names(proj_id);
        if dep_cols.len() != proj_cols.len() {
            return false;
        }
        for (i, proj_col) in proj_cols.iter().enumerate() {
            if &dep_cols[i] != proj_col {
                return false;
            }
            if columns[i].expr.prop_name() != Some(proj_col.as_str()) {
                return false;
            }
        }
        true
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let proj_gn = matched.node;
        let dep_gn = matched.dependencies[0].node;
        let proj_out = ctx.plan_of(proj_gn).output_var().to_owned();
        let dep_id = ctx.plan_id_of(dep_gn);

        let new_node = clone_with_output(ctx, dep_id, &proj_out);
        let new_gn = ctx.create_group_node(new_node, ctx.group_of(proj_gn));
        let deps = ctx.dependencies_of(dep_gn).to_vec();
        ctx.set_deps(new_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "RemoveNoopProjectRule"
    }
}

/// Inlines the lower of two stacked projects into the upper one, unless a
/// non-trivial lower column would end up evaluated more than once.
///
/// Before:
///   Project(exprs over a, b) <- Project(a: f(x), b: y)
/// After:
///   Project(exprs with a, b inlined)
pub struct CollapseProjectRule {
    pattern: Pattern,
}

impl CollapseProjectRule {
    pub fn new() -> Arc<Self> {
        Arc::new(CollapseProjectRule {
            pattern: Pattern::create(PlanKind::Project, vec![Pattern::node(PlanKind::Project)]),
        })
    }
}

impl OptRule for CollapseProjectRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let above_gn = matched.node;
        let below_gn = matched.dependencies[0].node;
        let above_id = ctx.plan_id_of(above_gn);
        let below_id = ctx.plan_id_of(below_gn);

        let above = ctx.qctx().plan_node(above_id);
        let above_out = above.output_var().to_owned();
        let cols_above = above.as_project().expect("pattern binds a project").columns.clone();
        let below = ctx.qctx().plan_node(below_id);
        let below_in = below.input_var(0).unwrap_or("").to_owned();
        let cols_below = below.as_project().expect("pattern binds a project").columns.clone();
        let below_col_names = ctx.qctx().col_names(below_id).to_vec();

        // Collect the property references the upper project makes, noting
        // which lower columns are referenced more than once.
        let mut seen = HashSet::new();
        let mut multi_ref: HashSet<String> = HashSet::new();
        for col in &cols_above {
            for prop in collect_exprs(&col.expr, &[ExprKind::VarProp, ExprKind::InputProp]) {
                let name = prop.prop_name().unwrap_or("").to_owned();
                if !seen.insert(name.clone()) {
                    multi_ref.insert(name);
                }
            }
        }

        // Map lower column names to their defining expressions. A
        // multiply-referenced column whose definition is not itself a
        // plain property reference would be evaluated repeatedly after
        // inlining, so the rewrite declines.
        let mut rewrite_map: HashMap<String, ExprRef> = HashMap::new();
        debug_assert_eq!(below_col_names.len(), cols_below.len());
        for (i, name) in below_col_names.iter().enumerate() {
            if !seen.contains(name) {
                continue;
            }
            let col_expr = &cols_below[i].expr;
            if !col_expr.is_property_expr() && multi_ref.contains(name) {
                return Ok(TransformResult::no_transform());
            }
            rewrite_map.insert(name.clone(), col_expr.clone());
        }

        let map = rewrite_map.clone();
        let new_columns: Vec<YieldColumn> = cols_above
            .iter()
            .map(|col| {
                let rewritten = rewrite_expr(
                    &col.expr,
                    &|e| {
                        matches!(e.kind(), ExprKind::VarProp | ExprKind::InputProp)
                            && e.prop_name().map(|p| map.contains_key(p)).unwrap_or(false)
                    },
                    &|e| {
                        let name = e.prop_name().expect("matcher checked the kind");
                        map[name].clone()
                    },
                );
                YieldColumn::new(rewritten, col.alias.clone())
            })
            .collect();

        let new_proj = clone_with_output(ctx, above_id, &above_out);
        ctx.qctx_mut()
            .plan_node_mut(new_proj)
            .as_project_mut()
            .expect("clone keeps the kind")
            .columns = new_columns;
        ctx.qctx_mut().set_input_var(new_proj, &below_in);

        let new_gn = ctx.create_group_node(new_proj, ctx.group_of(above_gn));
        let deps = ctx.dependencies_of(below_gn).to_vec();
        ctx.set_deps(new_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "CollapseProjectRule"
    }
}
