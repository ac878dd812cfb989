//! The fixed-point driver: memoize the plan, sweep the rule sets until
//! nothing changes or the round budget runs out, then realize the cheapest
//! candidate per group.

use std::collections::HashMap;

use quiver_plan::{NodeDetail, PlanNodeId, QueryContext};
use tracing::debug;

use crate::context::{OptContext, OptGroupId};
use crate::error::{OptError, Result};
use crate::rule::RuleSet;

/// Cap on full rule-set sweeps per optimization.
pub const MAX_ITERATION_ROUND: u8 = 8;

pub struct Optimizer {
    rule_sets: Vec<RuleSet>,
}

impl Optimizer {
    pub fn new(rule_sets: Vec<RuleSet>) -> Self {
        Optimizer { rule_sets }
    }

    /// The standard configuration: index selection first, then the query
    /// rewrites.
    pub fn with_default_rule_sets() -> Self {
        Optimizer::new(vec![
            crate::rules::default_rules(),
            crate::rules::query_rules(),
        ])
    }

    /// Optimize the plan rooted at `root` and return the realized best
    /// plan's root node. The memo is discarded on return; plan nodes
    /// survive in the query context.
    pub fn find_best_plan(&self, qctx: &mut QueryContext, root: PlanNodeId) -> Result<PlanNodeId> {
        let mut ctx = OptContext::new(qctx);
        let root_group = Self::prepare(&mut ctx, root)?;
        self.do_exploration(&mut ctx, root_group)?;
        ctx.group_plan(root_group)
    }

    /// Convert the plan DAG into the memo: one fresh group with a single
    /// candidate per distinct plan node, dependencies recursed, control
    /// flow attached as bodies.
    fn prepare(ctx: &mut OptContext<'_>, root: PlanNodeId) -> Result<OptGroupId> {
        let mut visited = HashMap::new();
        Self::convert_to_group(ctx, root, &mut visited)
    }

    fn convert_to_group(
        ctx: &mut OptContext<'_>,
        node_id: PlanNodeId,
        visited: &mut HashMap<PlanNodeId, OptGroupId>,
    ) -> Result<OptGroupId> {
        if let Some(group) = visited.get(&node_id) {
            return Ok(*group);
        }

        let group = ctx.create_group();
        let gn = ctx.make_group_node(group, node_id);

        let bodies: Vec<Option<PlanNodeId>> = match ctx.qctx().plan_node(node_id).detail() {
            NodeDetail::Select {
                then_body,
                else_body,
                ..
            } => vec![*then_body, *else_body],
            NodeDetail::Loop { body, .. } => vec![*body],
            _ => vec![],
        };
        for body in bodies {
            let body = body.ok_or_else(|| {
                OptError::PlanError(format!("control-flow node {node_id} has an unwired body"))
            })?;
            let body_group = Self::convert_to_group(ctx, body, visited)?;
            ctx.add_body(gn, body_group);
        }

        let num_deps = ctx.qctx().plan_node(node_id).num_deps();
        for i in 0..num_deps {
            let dep = ctx.qctx().plan_node(node_id).dep(i).ok_or_else(|| {
                OptError::PlanError(format!("plan node {node_id} has an unwired input {i}"))
            })?;
            let dep_group = Self::convert_to_group(ctx, dep, visited)?;
            ctx.depends_on(gn, dep_group);
        }

        visited.insert(node_id, group);
        Ok(group)
    }

    fn do_exploration(&self, ctx: &mut OptContext<'_>, root_group: OptGroupId) -> Result<()> {
        let mut applied_times = MAX_ITERATION_ROUND;
        while ctx.changed() {
            if applied_times == 0 {
                break;
            }
            applied_times -= 1;
            ctx.set_changed(false);
            for rule_set in &self.rule_sets {
                for rule in rule_set.rules() {
                    debug!(rule_set = rule_set.name(), rule = rule.name(), "exploring");
                    ctx.explore_until_max_round(root_group, rule.as_ref())?;
                    ctx.set_group_unexplored(root_group, rule.as_ref());
                }
            }
        }
        Ok(())
    }
}
