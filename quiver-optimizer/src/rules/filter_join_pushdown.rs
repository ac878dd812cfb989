//! Filter pushdown through joins: split the condition against each side's
//! column names and sink the halves under the corresponding inputs.

use std::sync::Arc;

use quiver_plan::expr::ExprRef;
use quiver_plan::PlanKind;

use crate::context::{OptContext, OptGroupId};
use crate::error::Result;
use crate::expr_rewrite::{check_col_names, split_filter};
use crate::rule::{MatchedResult, OptRule, Pattern, TransformResult};

fn join_pattern(join_kind: PlanKind) -> Pattern {
    Pattern::create(
        PlanKind::Filter,
        vec![Pattern::create(
            join_kind,
            vec![
                Pattern::node(PlanKind::Unknown),
                Pattern::node(PlanKind::Unknown),
            ],
        )],
    )
}

/// Sink the conjuncts of `condition` readable from `child`'s columns under
/// a fresh filter that takes over the child's output variable; the join
/// above keeps reading the same name. Returns the new group, or `None`
/// when nothing was pushable, with the unpushed remainder in `unpicked`.
fn push_filter_down_join_child(
    ctx: &mut OptContext<'_>,
    child: &MatchedResult,
    condition: Option<&ExprRef>,
    unpicked: &mut Option<ExprRef>,
) -> Result<Option<OptGroupId>> {
    let Some(condition) = condition else {
        return Ok(None);
    };
    let child_gn = child.node;
    let child_id = ctx.plan_id_of(child_gn);
    let col_names = ctx.qctx().col_names(child_id).to_vec();

    let (picked, rest) = split_filter(condition, |e| check_col_names(&col_names, e));
    *unpicked = rest;
    let Some(picked) = picked else {
        return Ok(None);
    };

    let child_out = ctx.qctx().plan_node(child_id).output_var().to_owned();
    let new_child = ctx.qctx_mut().clone_plan_node(child_id);
    let child_group = ctx.create_group();
    let new_child_gn = ctx.make_group_node(child_group, new_child);
    let child_deps = ctx.dependencies_of(child_gn).to_vec();
    ctx.set_deps(new_child_gn, &child_deps);

    // The pushed filter takes over the original child variable so the join
    // above is oblivious to the change.
    let new_filter = ctx.qctx_mut().make_filter(None, picked);
    ctx.qctx_mut().set_output_var(new_filter, &child_out);
    ctx.qctx_mut().set_col_names(new_filter, col_names);
    let new_child_out = ctx.qctx().plan_node(new_child).output_var().to_owned();
    ctx.qctx_mut().set_input_var(new_filter, &new_child_out);

    let filter_group = ctx.create_group();
    let filter_gn = ctx.make_group_node(filter_group, new_filter);
    ctx.depends_on(filter_gn, child_group);
    Ok(Some(filter_group))
}

/// Assemble the rewritten join (and the optional unpushed filter above it)
/// once per-side pushdown has produced the new input groups.
fn rebuild_join(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
    left_group: OptGroupId,
    right_group: OptGroupId,
    right_unpicked: Option<ExprRef>,
) -> Result<TransformResult> {
    let filter_gn = matched.node;
    let join_gn = matched.dependencies[0].node;
    let filter_id = ctx.plan_id_of(filter_gn);
    let join_id = ctx.plan_id_of(join_gn);

    let filter_out = ctx.qctx().plan_node(filter_id).output_var().to_owned();
    let new_join = ctx.qctx_mut().clone_plan_node(join_id);

    let new_join_gn = if right_unpicked.is_some() {
        let join_group = ctx.create_group();
        ctx.make_group_node(join_group, new_join)
    } else {
        ctx.create_group_node(new_join, ctx.group_of(filter_gn))
    };
    ctx.depends_on(new_join_gn, left_group);
    ctx.depends_on(new_join_gn, right_group);
    let left_var = ctx.group_output_var(left_group).to_owned();
    let right_var = ctx.group_output_var(right_group).to_owned();
    ctx.qctx_mut().set_input_var_at(new_join, 0, &left_var);
    ctx.qctx_mut().set_input_var_at(new_join, 1, &right_var);

    let new_root = if let Some(right_unpicked) = right_unpicked {
        let join_group = ctx.group_of(new_join_gn);
        let above_filter = ctx.qctx_mut().make_filter(None, right_unpicked);
        ctx.qctx_mut().set_output_var(above_filter, &filter_out);
        let new_join_out = ctx.qctx().plan_node(new_join).output_var().to_owned();
        ctx.qctx_mut().set_input_var(above_filter, &new_join_out);
        let above_gn = ctx.create_group_node(above_filter, ctx.group_of(filter_gn));
        ctx.depends_on(above_gn, join_group);
        above_gn
    } else {
        ctx.qctx_mut().set_output_var(new_join, &filter_out);
        new_join_gn
    };

    Ok(TransformResult::erase_all_with(vec![new_root]))
}

/// Pushes each half of a filter under the corresponding side of a hash
/// inner join.
pub struct PushFilterDownHashInnerJoinRule {
    pattern: Pattern,
}

impl PushFilterDownHashInnerJoinRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownHashInnerJoinRule {
            pattern: join_pattern(PlanKind::HashInnerJoin),
        })
    }
}

impl OptRule for PushFilterDownHashInnerJoinRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let condition = ctx
            .plan_of(matched.node)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let left_result = matched.result(&[0, 0, 0]).clone();
        let right_result = matched.result(&[0, 0, 1]).clone();

        let mut left_unpicked = None;
        let mut right_unpicked = None;
        let left_group =
            push_filter_down_join_child(ctx, &left_result, Some(&condition), &mut left_unpicked)?;
        let right_group = push_filter_down_join_child(
            ctx,
            &right_result,
            left_unpicked.as_ref(),
            &mut right_unpicked,
        )?;

        if left_group.is_none() && right_group.is_none() {
            return Ok(TransformResult::no_transform());
        }
        let left_group = left_group.unwrap_or_else(|| ctx.group_of(left_result.node));
        let right_group = right_group.unwrap_or_else(|| ctx.group_of(right_result.node));

        rebuild_join(ctx, matched, left_group, right_group, right_unpicked)
    }

    fn name(&self) -> &'static str {
        "PushFilterDownHashInnerJoinRule"
    }
}

/// Pushes the left-readable half of a filter under the left side of a hash
/// left join; the right side keeps its filter above (pushed predicates
/// would change null-extension semantics).
pub struct PushFilterDownHashLeftJoinRule {
    pattern: Pattern,
}

impl PushFilterDownHashLeftJoinRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownHashLeftJoinRule {
            pattern: join_pattern(PlanKind::HashLeftJoin),
        })
    }
}

impl OptRule for PushFilterDownHashLeftJoinRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let condition = ctx
            .plan_of(matched.node)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let left_result = matched.result(&[0, 0, 0]).clone();
        let right_result = matched.result(&[0, 0, 1]).clone();

        let mut unpicked = None;
        let left_group =
            push_filter_down_join_child(ctx, &left_result, Some(&condition), &mut unpicked)?;
        let Some(left_group) = left_group else {
            return Ok(TransformResult::no_transform());
        };
        let right_group = ctx.group_of(right_result.node);

        rebuild_join(ctx, matched, left_group, right_group, unpicked)
    }

    fn name(&self) -> &'static str {
        "PushFilterDownHashLeftJoinRule"
    }
}

/// Pushes each half of a filter under the corresponding side of a cross
/// join.
pub struct PushFilterDownCrossJoinRule {
    pattern: Pattern,
}

impl PushFilterDownCrossJoinRule {
    pub fn new() -> Arc<Self> {
        Arc::new(PushFilterDownCrossJoinRule {
            pattern: join_pattern(PlanKind::CrossJoin),
        })
    }
}

impl OptRule for PushFilterDownCrossJoinRule {
    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(
        &self,
        ctx: &mut OptContext<'_>,
        matched: &MatchedResult,
    ) -> Result<TransformResult> {
        let condition = ctx
            .plan_of(matched.node)
            .as_filter()
            .expect("pattern binds a filter")
            .condition
            .clone();
        let left_result = matched.result(&[0, 0, 0]).clone();
        let right_result = matched.result(&[0, 0, 1]).clone();

        let mut left_unpicked = None;
        let mut right_unpicked = None;
        let left_group =
            push_filter_down_join_child(ctx, &left_result, Some(&condition), &mut left_unpicked)?;
        let right_group = push_filter_down_join_child(
            ctx,
            &right_result,
            left_unpicked.as_ref(),
            &mut right_unpicked,
        )?;

        if left_group.is_none() && right_group.is_none() {
            return Ok(TransformResult::no_transform());
        }
        let left_group = left_group.unwrap_or_else(|| ctx.group_of(left_result.node));
        let right_group = right_group.unwrap_or_else(|| ctx.group_of(right_result.node));

        rebuild_join(ctx, matched, left_group, right_group, right_unpicked)
    }

    fn name(&self) -> &'static str {
        "PushFilterDownCrossJoinRule"
    }
}
