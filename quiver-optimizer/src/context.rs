//! Per-optimization scratchpad.
//!
//! `OptContext` owns the memo arenas (groups and group nodes are handles
//! into `Vec`s, never heap objects pointing at each other) and borrows the
//! query context for plan-node access. Dropping the `OptContext` discards
//! every group shell; the plan nodes themselves survive in the query
//! context, which is how the extracted best plan outlives optimization.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use quiver_plan::{PlanNode, PlanNodeId, QueryContext};
use tracing::warn;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct OptGroupId(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct OptGroupNodeId(pub(crate) usize);

impl Display for OptGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

impl Display for OptGroupNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// An equivalence class: candidate realizations that all produce the same
/// output variable.
pub(crate) struct GroupData {
    pub output_var: String,
    /// Candidates, in insertion order.
    pub group_nodes: Vec<OptGroupNodeId>,
    pub explored_rules: HashSet<&'static str>,
    /// Group nodes of other groups that depend on this group. When this
    /// empties the group releases its contents.
    pub referenced_by: HashSet<OptGroupNodeId>,
}

/// One candidate plan for its enclosing group.
pub(crate) struct GroupNodeData {
    pub plan_node: PlanNodeId,
    pub group: OptGroupId,
    /// Positional input groups, one per plan-node input slot.
    pub dependencies: Vec<OptGroupId>,
    /// Control-flow bodies: Select carries then/else, Loop carries one.
    pub bodies: Vec<OptGroupId>,
    pub explored_rules: HashSet<&'static str>,
    pub released: bool,
}

pub struct OptContext<'a> {
    qctx: &'a mut QueryContext,
    changed: bool,
    pub(crate) groups: Vec<GroupData>,
    pub(crate) group_nodes: Vec<GroupNodeData>,
    node_map: HashMap<PlanNodeId, OptGroupNodeId>,
}

impl<'a> OptContext<'a> {
    pub fn new(qctx: &'a mut QueryContext) -> Self {
        OptContext {
            qctx,
            changed: true,
            groups: Vec::new(),
            group_nodes: Vec::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn qctx(&self) -> &QueryContext {
        self.qctx
    }

    pub fn qctx_mut(&mut self) -> &mut QueryContext {
        self.qctx
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub(crate) fn group(&self, id: OptGroupId) -> &GroupData {
        &self.groups[id.0]
    }

    pub(crate) fn group_mut(&mut self, id: OptGroupId) -> &mut GroupData {
        &mut self.groups[id.0]
    }

    pub(crate) fn group_node(&self, id: OptGroupNodeId) -> &GroupNodeData {
        &self.group_nodes[id.0]
    }

    pub(crate) fn group_node_mut(&mut self, id: OptGroupNodeId) -> &mut GroupNodeData {
        &mut self.group_nodes[id.0]
    }

    /// The plan node a group node wraps.
    pub fn plan_of(&self, gn: OptGroupNodeId) -> &PlanNode {
        self.qctx.plan_node(self.group_node(gn).plan_node)
    }

    pub fn plan_id_of(&self, gn: OptGroupNodeId) -> PlanNodeId {
        self.group_node(gn).plan_node
    }

    pub fn group_of(&self, gn: OptGroupNodeId) -> OptGroupId {
        self.group_node(gn).group
    }

    pub fn dependencies_of(&self, gn: OptGroupNodeId) -> &[OptGroupId] {
        &self.group_node(gn).dependencies
    }

    pub fn bodies_of(&self, gn: OptGroupNodeId) -> &[OptGroupId] {
        &self.group_node(gn).bodies
    }

    pub fn group_nodes_of(&self, group: OptGroupId) -> &[OptGroupNodeId] {
        &self.group(group).group_nodes
    }

    pub fn group_output_var(&self, group: OptGroupId) -> &str {
        &self.group(group).output_var
    }

    pub(crate) fn register_group_node(&mut self, plan_node: PlanNodeId, gn: OptGroupNodeId) {
        if let Some(existing) = self.node_map.insert(plan_node, gn) {
            warn!(%plan_node, %existing, "plan node already registered in OptContext");
        }
    }

    /// Cross-navigation used by the data-flow checker: from a plan-node id
    /// back to the group node wrapping it.
    pub fn find_group_node_by_plan_id(&self, plan_node: PlanNodeId) -> Option<OptGroupNodeId> {
        self.node_map.get(&plan_node).copied()
    }
}
