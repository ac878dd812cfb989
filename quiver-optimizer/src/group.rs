//! Memo operations: group/group-node creation, wiring, release cascades,
//! and the bottom-up exploration loop that drives rule application.

use std::collections::HashSet;

use ordered_float::OrderedFloat;
use quiver_plan::{PlanKind, PlanNodeId};
use tracing::{debug, trace};

use crate::context::{GroupData, GroupNodeData, OptContext, OptGroupId, OptGroupNodeId};
use crate::error::{OptError, Result};
use crate::rule::OptRule;

/// Cap on re-exploration rounds of one group under one rule.
pub const MAX_EXPLORATION_ROUND: usize = 8;

impl OptContext<'_> {
    pub fn create_group(&mut self) -> OptGroupId {
        let id = OptGroupId(self.groups.len());
        self.groups.push(GroupData {
            output_var: String::new(),
            group_nodes: Vec::new(),
            explored_rules: HashSet::new(),
            referenced_by: HashSet::new(),
        });
        id
    }

    /// Create a group node without inserting it into the group's candidate
    /// list. Transform results are inserted by the exploration loop; use
    /// [`make_group_node`](Self::make_group_node) when the node should join
    /// the group immediately.
    pub fn create_group_node(
        &mut self,
        plan_node: PlanNodeId,
        group: OptGroupId,
    ) -> OptGroupNodeId {
        let id = OptGroupNodeId(self.group_nodes.len());
        self.group_nodes.push(GroupNodeData {
            plan_node,
            group,
            dependencies: Vec::new(),
            bodies: Vec::new(),
            explored_rules: HashSet::new(),
            released: false,
        });
        self.register_group_node(plan_node, id);
        id
    }

    /// Create a group node and add it to the group.
    pub fn make_group_node(&mut self, group: OptGroupId, plan_node: PlanNodeId) -> OptGroupNodeId {
        let gn = self.create_group_node(plan_node, group);
        self.add_group_node(group, gn);
        gn
    }

    /// Insert a candidate into a group, enforcing output-variable
    /// agreement across all candidates.
    pub fn add_group_node(&mut self, group: OptGroupId, gn: OptGroupNodeId) {
        debug_assert_eq!(self.group_node(gn).group, group);
        let plan_id = self.group_node(gn).plan_node;
        let output_var = self.qctx().plan_node(plan_id).output_var().to_owned();
        let data = self.group_mut(group);
        if data.output_var.is_empty() {
            data.output_var = output_var;
        } else {
            debug_assert_eq!(
                data.output_var, output_var,
                "group nodes must agree on the output variable"
            );
        }
        data.group_nodes.push(gn);
        self.qctx_mut().update_symbols(plan_id);
    }

    /// `gn` consumes `dep`'s output as its next positional input.
    pub fn depends_on(&mut self, gn: OptGroupNodeId, dep: OptGroupId) {
        self.group_node_mut(gn).dependencies.push(dep);
        self.group_mut(dep).referenced_by.insert(gn);
    }

    pub fn set_deps(&mut self, gn: OptGroupNodeId, deps: &[OptGroupId]) {
        for dep in deps {
            self.depends_on(gn, *dep);
        }
    }

    pub fn add_body(&mut self, gn: OptGroupNodeId, body: OptGroupId) {
        self.group_node_mut(gn).bodies.push(body);
        self.group_mut(body).referenced_by.insert(gn);
    }

    /// Detach a group node from its dependency groups and release its plan
    /// node's symbols. Dependency groups that lose their last referrer
    /// release their own contents, cascading.
    pub(crate) fn release_group_node(&mut self, gn: OptGroupNodeId) {
        if self.group_node(gn).released {
            return;
        }
        self.group_node_mut(gn).released = true;
        let plan_id = self.group_node(gn).plan_node;
        self.qctx_mut().release_symbols(plan_id);
        let deps = self.group_node(gn).dependencies.clone();
        for dep in deps {
            self.delete_ref_group_node(dep, gn);
        }
    }

    fn delete_ref_group_node(&mut self, group: OptGroupId, gn: OptGroupNodeId) {
        let data = self.group_mut(group);
        data.referenced_by.remove(&gn);
        if data.referenced_by.is_empty() {
            let nodes = std::mem::take(&mut data.group_nodes);
            for n in nodes {
                self.release_group_node(n);
            }
        }
    }

    fn is_group_explored(&self, group: OptGroupId, rule: &dyn OptRule) -> bool {
        self.group(group).explored_rules.contains(rule.name())
    }

    /// Clear the explored bit for `rule` on the whole DAG under `group`.
    pub(crate) fn set_group_unexplored(&mut self, group: OptGroupId, rule: &dyn OptRule) {
        self.group_mut(group).explored_rules.remove(rule.name());
        let nodes = self.group(group).group_nodes.clone();
        for gn in nodes {
            self.set_group_node_unexplored(gn, rule);
        }
    }

    fn set_group_node_unexplored(&mut self, gn: OptGroupNodeId, rule: &dyn OptRule) {
        self.group_node_mut(gn).explored_rules.remove(rule.name());
        let data = self.group_node(gn);
        let children: Vec<OptGroupId> = data
            .dependencies
            .iter()
            .chain(data.bodies.iter())
            .copied()
            .collect();
        for child in children {
            self.set_group_unexplored(child, rule);
        }
    }

    /// Loop `explore` until the group settles or the per-rule round cap is
    /// hit; the cap guarantees termination even for rules that keep
    /// reopening the group.
    pub(crate) fn explore_until_max_round(
        &mut self,
        group: OptGroupId,
        rule: &dyn OptRule,
    ) -> Result<()> {
        let mut round = MAX_EXPLORATION_ROUND;
        while !self.is_group_explored(group, rule) {
            if round == 0 {
                self.group_mut(group).explored_rules.insert(rule.name());
                break;
            }
            round -= 1;
            self.explore(group, rule)?;
        }
        Ok(())
    }

    /// One bottom-up pass of `rule` over this group: explore every
    /// candidate's inputs first, then try the rule at the candidate.
    fn explore(&mut self, group: OptGroupId, rule: &dyn OptRule) -> Result<()> {
        if self.is_group_explored(group, rule) {
            return Ok(());
        }
        self.group_mut(group).explored_rules.insert(rule.name());

        let mut idx = 0;
        while idx < self.group(group).group_nodes.len() {
            let gn = self.group(group).group_nodes[idx];
            if self.group_node(gn).explored_rules.contains(rule.name()) {
                idx += 1;
                continue;
            }
            self.explore_group_node(gn, rule)?;

            let matched = match rule.pattern().match_group_node(self, gn) {
                Some(m) if rule.matches(self, &m) => m,
                _ => {
                    idx += 1;
                    continue;
                }
            };
            trace!(rule = rule.name(), group = %group, node = %gn, "rule matched");
            let result = rule.transform(self, &matched)?;
            if !result.new_group_nodes.is_empty() {
                self.set_changed(true);
            }

            if result.erase_all {
                debug!(rule = rule.name(), group = %group, "transform replaces whole group");
                let nodes = std::mem::take(&mut self.group_mut(group).group_nodes);
                for n in nodes {
                    self.release_group_node(n);
                }
                for ngn in result.new_group_nodes {
                    self.add_group_node(group, ngn);
                }
                break;
            }

            if !result.new_group_nodes.is_empty() {
                debug!(rule = rule.name(), group = %group, "transform added candidates");
                for ngn in result.new_group_nodes {
                    self.add_group_node(group, ngn);
                }
                self.set_group_unexplored(group, rule);
            }

            if result.erase_curr {
                self.release_group_node(gn);
                self.group_mut(group).group_nodes.remove(idx);
            } else {
                idx += 1;
            }
        }

        if self.group(group).group_nodes.is_empty() {
            return Err(OptError::Internal(format!(
                "group {group} has no candidates left after applying {}",
                rule.name()
            )));
        }
        #[cfg(debug_assertions)]
        self.verify_group(group);
        Ok(())
    }

    /// Debug check of the memo invariants for one group: output-variable
    /// agreement, dependency arity, and data-flow identity per input slot.
    #[cfg(debug_assertions)]
    pub(crate) fn verify_group(&self, group: OptGroupId) {
        let group_var = &self.group(group).output_var;
        for &gn in &self.group(group).group_nodes {
            let data = self.group_node(gn);
            let plan = self.qctx().plan_node(data.plan_node);
            assert_eq!(
                plan.output_var(),
                group_var,
                "group {group} candidate {gn} disagrees on the output variable"
            );
            assert_eq!(
                data.dependencies.len(),
                plan.num_deps(),
                "group {group} candidate {gn} has the wrong dependency arity"
            );
            if plan.input_vars().len() == data.dependencies.len() {
                for (i, dep) in data.dependencies.iter().enumerate() {
                    let dep_var = &self.group(*dep).output_var;
                    if dep_var.is_empty() {
                        continue;
                    }
                    assert_eq!(
                        plan.input_var(i).unwrap_or(""),
                        dep_var,
                        "group {group} candidate {gn} input {i} does not read its dependency"
                    );
                }
            }
        }
    }

    /// Dependencies and bodies first, then the node itself is up for
    /// matching.
    fn explore_group_node(&mut self, gn: OptGroupNodeId, rule: &dyn OptRule) -> Result<()> {
        if self.group_node(gn).explored_rules.contains(rule.name()) {
            return Ok(());
        }
        self.group_node_mut(gn).explored_rules.insert(rule.name());

        let data = self.group_node(gn);
        let children: Vec<OptGroupId> = data
            .dependencies
            .iter()
            .chain(data.bodies.iter())
            .copied()
            .collect();
        for child in children {
            self.explore_until_max_round(child, rule)?;
        }
        Ok(())
    }

    /// The cheapest candidate, first wins on ties so extraction is
    /// deterministic.
    pub(crate) fn find_min_cost_group_node(&self, group: OptGroupId) -> Option<OptGroupNodeId> {
        let mut min_cost = OrderedFloat(f64::MAX);
        let mut min_gn = None;
        for &gn in &self.group(group).group_nodes {
            let cost = OrderedFloat(self.plan_of(gn).cost());
            if cost < min_cost {
                min_cost = cost;
                min_gn = Some(gn);
            }
        }
        min_gn
    }

    /// Materialize the chosen plan for this group: pick the min-cost
    /// candidate, install its chosen bodies for control-flow nodes, and
    /// wire each positional dependency to the child group's chosen plan.
    pub(crate) fn group_plan(&mut self, group: OptGroupId) -> Result<PlanNodeId> {
        let gn = self.find_min_cost_group_node(group).ok_or_else(|| {
            OptError::Internal(format!("no group nodes in group {group} to realize"))
        })?;
        let plan_id = self.group_node(gn).plan_node;
        let kind = self.qctx().plan_node(plan_id).kind();

        let bodies = self.group_node(gn).bodies.clone();
        match kind {
            PlanKind::Select => {
                if bodies.len() != 2 {
                    return Err(OptError::PlanError(format!(
                        "select node {plan_id} has {} bodies",
                        bodies.len()
                    )));
                }
                let then_plan = self.group_plan(bodies[0])?;
                let else_plan = self.group_plan(bodies[1])?;
                let node = self.qctx_mut().plan_node_mut(plan_id);
                node.set_if(then_plan);
                node.set_else(else_plan);
            }
            PlanKind::Loop => {
                if bodies.len() != 1 {
                    return Err(OptError::PlanError(format!(
                        "loop node {plan_id} has {} bodies",
                        bodies.len()
                    )));
                }
                let body_plan = self.group_plan(bodies[0])?;
                self.qctx_mut().plan_node_mut(plan_id).set_body(body_plan);
            }
            _ => {}
        }

        let deps = self.group_node(gn).dependencies.clone();
        if deps.len() != self.qctx().plan_node(plan_id).num_deps() {
            return Err(OptError::Internal(format!(
                "group node arity mismatch at {plan_id}"
            )));
        }
        for (i, dep) in deps.into_iter().enumerate() {
            let dep_plan = self.group_plan(dep)?;
            self.qctx_mut().plan_node_mut(plan_id).set_dep(i, dep_plan);
        }
        Ok(plan_id)
    }
}
