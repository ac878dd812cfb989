//! Filter pushdown: a filter moves below an operator (or into its
//! storage-side filter slot) whenever the guarded sub-expression only
//! depends on columns produced underneath.

use std::collections::HashMap;
use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprKind, ExprRef};
use quiver_plan::{NodeDetail, PlanKind};

use crate::context::{OptContext, OptGroupNodeId};
use crate::error::Result;
use crate::expr_rewrite::{
    collect_exprs, extract_edge_filter, extract_vertex_filter, rewrite_expr, split_filter,
    PROPERTY_KINDS,
};
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::{clone_with_output, refs_only_alias, VID_COL};

/// Pushes the passthrough-column part of a filter below a project,
/// rewriting the pushed predicate onto the project's input expressions.
///
/// Before:
///   Filter($-.a > 3) <- Project(v.t.x AS a)
/// After:
///   Project(v.t.x AS a) <- Filter(v.t.x > 3)
pub struct PushFilterDownProjectRule {
    pattern: Pattern,
}

impl PushFilterDownProjectRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownProjectRule {
            pattern: Pattern::create(PlanKind::Filter, vec![Pattern::node(PlanKind::Project)]),
        })
    }

    /// Column definitions a pushed filter may be rewritten onto: property
    /// references, optionally behind a subscript.
    fn is_passthrough_column(expr: &ExprRef) -> bool {
        if expr.is_property_expr() {
            return true;
        }
        match expr.as_ref() {
            Expr::Subscript { collection, .. } => collection.is_property_expr(),
            _ => false,
        }
    }
}

impl OptRule for PushFilterDownProjectRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let proj_gn = matched.dependencies[0].node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let proj_id = ctx.plan_id_of(proj_gn);

        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
        let condition = ctx
            .qctx()
            .plan_node(filter_id)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let proj_cols = ctx
            .qctx()
            .plan_node(proj_id)
            .as_project()
            .expect("pattern binds a project")
            .columns
            .clone();
        let proj_col_names = ctx.qctx().col_names(proj_id).to_vec();
        let proj_in = ctx.qctx().plan_node(proj_id).input_var(0).unwrap_or("").to_owned();

        let mut rewrite_map: HashMap<String, ExprRef> = HashMap::new();
        for (name, col) in proj_col_names.iter().zip(proj_cols.iter()) {
            if Self::is_passthrough_column(&col.expr) {
                rewrite_map.insert(name.clone(), col.expr.clone());
            }
        }

        let picker = |e: &ExprRef| -> bool {
            let props = collect_exprs(e, PROPERTY_KINDS);
            if props.is_empty() {
                return false;
            }
            props.iter().all(|p| {
                p.prop_name()
                    .map(|name| rewrite_map.contains_key(name))
                    .unwrap_or(false)
            })
        };
        let (picked, unpicked) = split_filter(&condition, picker);
        let Some(picked) = picked else {
            return Ok(TransformResult::no_transform());
        };

        let map = rewrite_map.clone();
        let rewritten = rewrite_expr(
            &picked,
            &|e| {
                e.is_property_expr()
                    && e.prop_name().map(|p| map.contains_key(p)).unwrap_or(false)
            },
            &|e| map[e.prop_name().expect("matcher checked the kind")].clone(),
        );

        // New filter below the project, over the project's input.
        let below_filter = ctx.qctx_mut().make_filter(None, rewritten);
        ctx.qctx_mut().set_input_var(below_filter, &proj_in);
        let in_cols = ctx.qctx().var_col_names(&proj_in).to_vec();
        ctx.qctx_mut().set_col_names(below_filter, in_cols);
        let below_group = ctx.create_group();
        let below_gn = ctx.make_group_node(below_group, below_filter);
        let proj_deps = ctx.dependencies_of(proj_gn).to_vec();
        ctx.set_deps(below_gn, &proj_deps);

        let new_proj = ctx.qctx_mut().clone_plan_node(proj_id);
        let below_out = ctx.qctx().plan_node(below_filter).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_proj, &below_out);

        let new_root = if let Some(unpicked) = unpicked {
            let new_proj_group = ctx.create_group();
            let new_proj_gn = ctx.make_group_node(new_proj_group, new_proj);
            ctx.depends_on(new_proj_gn, below_group);

            let above_filter = ctx.qctx_mut().make_filter(None, unpicked);
            ctx.qctx_mut().set_output_var(above_filter, &filter_out);
            let new_proj_out = ctx.qctx().plan_node(new_proj).output_var().to_owned();
            ctx.qctx_mut().set_input_var(above_filter, &new_proj_out);
            let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
            ctx.depends_on(above_gn, new_proj_group);
            above_gn
        } else {
            ctx.qctx_mut().set_output_var(new_proj, &filter_out);
            let proj_out_cols = proj_col_names;
            ctx.qctx_mut().set_col_names(new_proj, proj_out_cols);
            let new_proj_gn = ctx.create_group_node(new_proj, ctx.group_of(filter_gn));
            ctx.depends_on(new_proj_gn, below_group);
            new_proj_gn
        };

        Ok(TransformResult::erase_all_with(vec![new_root]))
    }

    fn name(&self) -> &'static str {
        "PushFilterDownProjectRule"
    }
}

/// A filter reading only the input columns of an `AppendVertices` (never
/// the appended node) moves below it.
pub struct PushFilterThroughAppendVerticesRule {
    pattern: Pattern,
}

impl PushFilterThroughAppendVerticesRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterThroughAppendVerticesRule {
            pattern: Pattern::create(
                PlanKind::Filter,
                vec![Pattern::node(PlanKind::AppendVertices)],
            ),
        })
    }
}

impl OptRule for PushFilterThroughAppendVerticesRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let av_gn = matched.dependencies[0].node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let av_id = ctx.plan_id_of(av_gn);

        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
        let condition = ctx
            .qctx()
            .plan_node(filter_id)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let av_in = ctx.qctx().plan_node(av_id).input_var(0).unwrap_or("").to_owned();
        let input_cols = ctx.qctx().var_col_names(&av_in).to_vec();
        let node_alias = ctx.qctx().col_names(av_id).last().cloned().unwrap_or_default();
        let av_col_names = ctx.qctx().col_names(av_id).to_vec();

        let picker = |e: &ExprRef| -> bool {
            for prop in collect_exprs(e, PROPERTY_KINDS) {
                if let Expr::AliasTagProp { alias, .. } = prop.as_ref() {
                    if *alias == node_alias {
                        return false;
                    }
                }
                let covered = prop
                    .prop_name()
                    .map(|name| input_cols.iter().any(|c| c == name))
                    .unwrap_or(false);
                if !covered {
                    return false;
                }
            }
            !matches!(e.as_ref(), Expr::Variable(var) if *var == node_alias)
        };
        let (picked, unpicked) = split_filter(&condition, picker);
        let Some(picked) = picked else {
            return Ok(TransformResult::no_transform());
        };

        let below_filter = ctx.qctx_mut().make_filter(None, picked);
        ctx.qctx_mut().set_input_var(below_filter, &av_in);
        ctx.qctx_mut().set_col_names(below_filter, input_cols);
        let below_group = ctx.create_group();
        let below_gn = ctx.make_group_node(below_group, below_filter);
        let av_deps = ctx.dependencies_of(av_gn).to_vec();
        ctx.set_deps(below_gn, &av_deps);

        let new_av = ctx.qctx_mut().clone_plan_node(av_id);
        let below_out = ctx.qctx().plan_node(below_filter).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_av, &below_out);

        let new_root = if let Some(unpicked) = unpicked {
            let new_av_group = ctx.create_group();
            let new_av_gn = ctx.make_group_node(new_av_group, new_av);
            ctx.depends_on(new_av_gn, below_group);

            let above_filter = ctx.qctx_mut().make_filter(None, unpicked);
            ctx.qctx_mut().set_output_var(above_filter, &filter_out);
            let new_av_out = ctx.qctx().plan_node(new_av).output_var().to_owned();
            ctx.qctx_mut().set_input_var(above_filter, &new_av_out);
            let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
            ctx.depends_on(above_gn, new_av_group);
            above_gn
        } else {
            ctx.qctx_mut().set_output_var(new_av, &filter_out);
            ctx.qctx_mut().set_col_names(new_av, av_col_names);
            let new_av_gn = ctx.create_group_node(new_av, ctx.group_of(filter_gn));
            ctx.depends_on(new_av_gn, below_group);
            new_av_gn
        };

        Ok(TransformResult::erase_all_with(vec![new_root]))
    }

    fn name(&self) -> &'static str {
        "PushFilterThroughAppendVerticesRule"
    }
}

/// Shared rewrite for `Filter <- storage-op`: the storage-evaluable part
/// of the condition fuses into the operator's filter slot, the rest (if
/// any) stays in a filter above.
fn push_filter_into_storage(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
    extract: fn(&ExprRef) -> (Option<ExprRef>, Option<ExprRef>),
) -> Result<TransformResult> {
    let filter_gn = matched.node;
    let scan_gn = matched.dependencies[0].node;
    let filter_id = ctx.plan_id_of(filter_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
    let condition = ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();
    let (pushed, remained) = extract(&condition);
    let Some(pushed) = pushed else {
        return Ok(TransformResult::no_transform());
    };

    let old_scan_filter = ctx.qctx().plan_node(scan_id).storage_filter().cloned();
    let new_scan_filter = match old_scan_filter {
        Some(existing) => Expr::and(pushed, existing),
        None => pushed,
    };

    let new_scan = ctx.qctx_mut().clone_plan_node(scan_id);
    ctx.qctx_mut()
        .plan_node_mut(new_scan)
        .set_storage_filter(Some(new_scan_filter));

    let new_root: OptGroupNodeId;
    let new_scan_gn: OptGroupNodeId;
    if let Some(remained) = remained {
        let scan_group = ctx.create_group();
        new_scan_gn = ctx.make_group_node(scan_group, new_scan);

        let above_filter = ctx.qctx_mut().make_filter(None, remained);
        ctx.qctx_mut().set_output_var(above_filter, &filter_out);
        let new_scan_out = ctx.qctx().plan_node(new_scan).output_var().to_owned();
        ctx.qctx_mut().set_input_var(above_filter, &new_scan_out);
        let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
        ctx.depends_on(above_gn, scan_group);
        new_root = above_gn;
    } else {
        ctx.qctx_mut().set_output_var(new_scan, &filter_out);
        new_scan_gn = ctx.create_group_node(new_scan, ctx.group_of(filter_gn));
        new_root = new_scan_gn;
    }
    let scan_deps = ctx.dependencies_of(scan_gn).to_vec();
    ctx.set_deps(new_scan_gn, &scan_deps);

    Ok(TransformResult::erase_curr_with(vec![new_root]))
}

macro_rules! push_filter_into_storage_rule {
    ($rule:ident, $name:literal, $kind:ident, $extract:expr) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Filter,
                        vec![Pattern::node(PlanKind::$kind)],
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
                push_filter_into_storage(ctx, matched, $extract)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

push_filter_into_storage_rule!(
    PushFilterDownScanVerticesRule,
    "PushFilterDownScanVerticesRule",
    ScanVertices,
    extract_vertex_filter
);
push_filter_into_storage_rule!(
    PushFilterDownGetNbrsRule,
    "PushFilterDownGetNbrsRule",
    GetNeighbors,
    extract_edge_filter
);
push_filter_into_storage_rule!(
    PushFilterDownAllPathsRule,
    "PushFilterDownAllPathsRule",
    AllPaths,
    extract_edge_filter
);
push_filter_into_storage_rule!(
    PushFilterDownExpandAllRule,
    "PushFilterDownExpandAllRule",
    ExpandAll,
    extract_edge_filter
);

/// Lowers the not-yet-lowered vertex predicate of a `Traverse` or
/// `AppendVertices` into its storage-side filter slots.
pub struct PushFilterDownNodeRule {
    pattern: Pattern,
}

impl PushFilterDownNodeRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownNodeRule {
            pattern: Pattern::create_multi(
                vec![PlanKind::Traverse, PlanKind::AppendVertices],
                vec![],
            ),
        })
    }
}

impl OptRule for PushFilterDownNodeRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let node = ctx.plan_of(matched.node);
        match node.detail() {
            NodeDetail::Traverse(d) => d.v_filter.is_some(),
            NodeDetail::AppendVertices(d) => d.v_filter.is_some(),
            _ => false,
        }
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let gn = matched.node;
        let node_id = ctx.plan_id_of(gn);
        let node = ctx.qctx().plan_node(node_id);
        let output_var = node.output_var().to_owned();
        let v_filter = match node.detail() {
            NodeDetail::Traverse(d) => d.v_filter.clone(),
            NodeDetail::AppendVertices(d) => d.v_filter.clone(),
            _ => None,
        }
        .expect("matches() checked the vertex filter");

        let (pushed, remained) = extract_vertex_filter(&v_filter);
        let Some(pushed) = pushed else {
            return Ok(TransformResult::no_transform());
        };

        let storage_filter = ctx.qctx().plan_node(node_id).storage_filter().cloned();
        let combined = match storage_filter {
            Some(existing) => Expr::and(pushed, existing),
            None => pushed,
        };

        let new_node = clone_with_output(ctx, node_id, &output_var);
        match ctx.qctx_mut().plan_node_mut(new_node).detail_mut() {
            NodeDetail::Traverse(d) => {
                d.v_filter = remained;
                d.first_step_filter = Some(match d.first_step_filter.take() {
                    Some(first) => Expr::and(combined, first),
                    None => combined,
                });
            }
            NodeDetail::AppendVertices(d) => {
                d.v_filter = remained;
                d.filter = Some(combined);
            }
            _ => unreachable!("pattern restricts the kinds"),
        }

        let new_gn = ctx.create_group_node(new_node, ctx.group_of(gn));
        let deps = ctx.dependencies_of(gn).to_vec();
        ctx.set_deps(new_gn, &deps);

        Ok(TransformResult::erase_all_with(vec![new_gn]))
    }

    fn name(&self) -> &'static str {
        "PushFilterDownNodeRule"
    }
}

/// Splits a filter above `AppendVertices` and pushes the conjuncts that
/// only touch the appended node alias into the vertex-filter slot.
pub struct PushFilterDownAppendVerticesRule {
    pattern: Pattern,
}

impl PushFilterDownAppendVerticesRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownAppendVerticesRule {
            pattern: Pattern::create(
                PlanKind::Filter,
                vec![Pattern::node(PlanKind::AppendVertices)],
            ),
        })
    }
}

impl OptRule for PushFilterDownAppendVerticesRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let av_gn = matched.dependencies[0].node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let av_id = ctx.plan_id_of(av_gn);

        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
        let condition = ctx
            .qctx()
            .plan_node(filter_id)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let node_alias = ctx.qctx().col_names(av_id).last().cloned().unwrap_or_default();

        let (picked, unpicked) = split_filter(&condition, |e| refs_only_alias(e, &node_alias));
        let Some(picked) = picked else {
            return Ok(TransformResult::no_transform());
        };
        let lowered = crate::expr_rewrite::rewrite_alias_tag_props(&picked, &node_alias);

        let new_av = ctx.qctx_mut().clone_plan_node(av_id);
        {
            let detail = ctx
                .qctx_mut()
                .plan_node_mut(new_av)
                .as_append_vertices_mut()
                .expect("clone keeps the kind");
            detail.v_filter = Some(match detail.v_filter.take() {
                Some(existing) => Expr::and(lowered, existing),
                None => lowered,
            });
        }

        let new_root = if let Some(unpicked) = unpicked {
            let av_group = ctx.create_group();
            let new_av_gn = ctx.make_group_node(av_group, new_av);
            let av_deps = ctx.dependencies_of(av_gn).to_vec();
            ctx.set_deps(new_av_gn, &av_deps);

            let above_filter = ctx.qctx_mut().make_filter(None, unpicked);
            ctx.qctx_mut().set_output_var(above_filter, &filter_out);
            let new_av_out = ctx.qctx().plan_node(new_av).output_var().to_owned();
            ctx.qctx_mut().set_input_var(above_filter, &new_av_out);
            let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
            ctx.depends_on(above_gn, av_group);
            above_gn
        } else {
            ctx.qctx_mut().set_output_var(new_av, &filter_out);
            let new_av_gn = ctx.create_group_node(new_av, ctx.group_of(filter_gn));
            let av_deps = ctx.dependencies_of(av_gn).to_vec();
            ctx.set_deps(new_av_gn, &av_deps);
            new_av_gn
        };

        Ok(TransformResult::erase_curr_with(vec![new_root]))
    }

    fn name(&self) -> &'static str {
        "PushFilterDownAppendVerticesRule"
    }
}

/// Splits a filter above `AppendVertices <- Traverse` and pushes the
/// conjuncts that only touch the traversed edge alias into the traverse's
/// edge filter.
pub struct PushFilterDownTraverseRule {
    pattern: Pattern,
}

impl PushFilterDownTraverseRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownTraverseRule {
            pattern: Pattern::create(
                PlanKind::Filter,
                vec![Pattern::create(
                    PlanKind::AppendVertices,
                    vec![Pattern::node(PlanKind::Traverse)],
                )],
            ),
        })
    }
}

impl OptRule for PushFilterDownTraverseRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let filter_gn = matched.node;
        let av_gn = matched.dependencies[0].node;
        let tv_gn = matched.dependencies[0].dependencies[0].node;
        let filter_id = ctx.plan_id_of(filter_gn);
        let av_id = ctx.plan_id_of(av_gn);
        let tv_id = ctx.plan_id_of(tv_gn);

        let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
        let condition = ctx
            .qctx()
            .plan_node(filter_id)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let edge_alias = ctx.qctx().col_names(tv_id).last().cloned().unwrap_or_default();

        let (picked, unpicked) = split_filter(&condition, |e| refs_only_alias(e, &edge_alias));
        let Some(picked) = picked else {
            return Ok(TransformResult::no_transform());
        };

        let new_tv = ctx.qctx_mut().clone_plan_node(tv_id);
        {
            let detail = ctx
                .qctx_mut()
                .plan_node_mut(new_tv)
                .as_traverse_mut()
                .expect("clone keeps the kind");
            detail.e_filter = Some(match detail.e_filter.take() {
                Some(existing) => Expr::and(picked, existing),
                None => picked,
            });
        }
        let tv_group = ctx.create_group();
        let new_tv_gn = ctx.make_group_node(tv_group, new_tv);
        let tv_deps = ctx.dependencies_of(tv_gn).to_vec();
        ctx.set_deps(new_tv_gn, &tv_deps);

        let new_av = ctx.qctx_mut().clone_plan_node(av_id);
        let new_tv_out = ctx.qctx().plan_node(new_tv).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_av, &new_tv_out);

        let new_root = if let Some(unpicked) = unpicked {
            let av_group = ctx.create_group();
            let new_av_gn = ctx.make_group_node(av_group, new_av);
            ctx.depends_on(new_av_gn, tv_group);

            let above_filter = ctx.qctx_mut().make_filter(None, unpicked);
            ctx.qctx_mut().set_output_var(above_filter, &filter_out);
            let new_av_out = ctx.qctx().plan_node(new_av).output_var().to_owned();
            ctx.qctx_mut().set_input_var(above_filter, &new_av_out);
            let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
            ctx.depends_on(above_gn, av_group);
            above_gn
        } else {
            ctx.qctx_mut().set_output_var(new_av, &filter_out);
            let new_av_gn = ctx.create_group_node(new_av, ctx.group_of(filter_gn));
            ctx.depends_on(new_av_gn, tv_group);
            new_av_gn
        };

        Ok(TransformResult::erase_curr_with(vec![new_root]))
    }

    fn name(&self) -> &'static str {
        "PushFilterDownTraverseRule"
    }
}

/// An `AppendVertices` fed directly by `ScanVertices` through `_vid` can
/// hand its storage-evaluable vertex predicate to the scan.
pub struct PushVFilterDownScanVerticesRule {
    pattern: Pattern,
}

impl PushVFilterDownScanVerticesRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushVFilterDownScanVerticesRule {
            pattern: Pattern::create(
                PlanKind::AppendVertices,
                vec![Pattern::node(PlanKind::ScanVertices)],
            ),
        })
    }
}

impl OptRule for PushVFilterDownScanVerticesRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        if !default_match(ctx, matched) {
            return false;
        }
        let av = ctx.plan_of(matched.node);
        let detail = av.as_append_vertices().expect("pattern binds append vertices");
        let src_is_vid = match detail.src.as_ref() {
            Expr::InputProp(prop) => prop == VID_COL,
            Expr::VarProp { prop, .. } => prop == VID_COL,
            _ => false,
        };
        if !src_is_vid {
            return false;
        }
        let Some(v_filter) = &detail.v_filter else {
            return false;
        };
        // A wildcard tag reference cannot be evaluated by one storage scan.
        collect_exprs(v_filter, &[ExprKind::TagProp])
            .iter()
            .all(|e| !matches!(e.as_ref(), Expr::TagProp { tag, .. } if tag == "*"))
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let av_gn = matched.node;
        let sv_gn = matched.dependencies[0].node;
        let av_id = ctx.plan_id_of(av_gn);
        let sv_id = ctx.plan_id_of(sv_gn);

        let av_out = ctx.qctx().plan_node(av_id).output_var().to_owned();
        let v_filter = ctx
            .qctx()
            .plan_node(av_id)
            .as_append_vertices()
            .expect("pattern binds append vertices")
            .v_filter
            .clone()
            .expect("matches() checked the vertex filter");

        let (pushed, remained) = extract_vertex_filter(&v_filter);
        let Some(pushed) = pushed else {
            return Ok(TransformResult::no_transform());
        };

        let new_av = clone_with_output(ctx, av_id, &av_out);
        ctx.qctx_mut()
            .plan_node_mut(new_av)
            .as_append_vertices_mut()
            .expect("clone keeps the kind")
            .v_filter = remained;
        let new_av_gn = ctx.create_group_node(new_av, ctx.group_of(av_gn));

        let old_sv_filter = ctx.qctx().plan_node(sv_id).as_scan_vertices().and_then(|d| d.filter.clone());
        let new_sv_filter = match old_sv_filter {
            Some(existing) => Expr::and(pushed, existing),
            None => pushed,
        };
        let new_sv = ctx.qctx_mut().clone_plan_node(sv_id);
        ctx.qctx_mut()
            .plan_node_mut(new_sv)
            .as_scan_vertices_mut()
            .expect("clone keeps the kind")
            .filter = Some(new_sv_filter);

        let sv_group = ctx.create_group();
        let new_sv_gn = ctx.make_group_node(sv_group, new_sv);
        ctx.depends_on(new_av_gn, sv_group);
        let new_sv_out = ctx.qctx().plan_node(new_sv).output_var().to_owned();
        ctx.qctx_mut().set_input_var(new_av, &new_sv_out);
        let sv_deps = ctx.dependencies_of(sv_gn).to_vec();
        ctx.set_deps(new_sv_gn, &sv_deps);

        Ok(TransformResult::erase_curr_with(vec![new_av_gn]))
    }

    fn name(&self) -> &'static str {
        "PushVFilterDownScanVerticesRule"
    }
}
