//! The declarative side of the optimizer: tree patterns over the memo,
//! match witnesses, transform results, and the rule/rule-set interfaces.

use std::sync::Arc;

use quiver_plan::{PlanKind, PlanNodeId};

use crate::context::{OptContext, OptGroupId, OptGroupNodeId};
use crate::error::Result;

#[derive(Debug, Clone)]
enum PatternKinds {
    /// Matches any plan-node kind.
    Any,
    Single(PlanKind),
    OneOf(Vec<PlanKind>),
}

impl PatternKinds {
    fn matches(&self, kind: PlanKind) -> bool {
        match self {
            PatternKinds::Any => true,
            PatternKinds::Single(k) => *k == kind,
            PatternKinds::OneOf(ks) => ks.contains(&kind),
        }
    }
}

/// A tree of kind constraints. An empty child list means "ignore the
/// children"; a non-empty list requires the exact dependency arity and
/// matches each child pattern against the corresponding dependency group.
#[derive(Debug, Clone)]
pub struct Pattern {
    kinds: PatternKinds,
    deps: Vec<Pattern>,
}

impl Pattern {
    pub fn node(kind: PlanKind) -> Pattern {
        Pattern::create(kind, vec![])
    }

    pub fn create(kind: PlanKind, deps: Vec<Pattern>) -> Pattern {
        let kinds = if kind == PlanKind::Unknown {
            PatternKinds::Any
        } else {
            PatternKinds::Single(kind)
        };
        Pattern { kinds, deps }
    }

    pub fn create_multi(kinds: Vec<PlanKind>, deps: Vec<Pattern>) -> Pattern {
        Pattern {
            kinds: PatternKinds::OneOf(kinds),
            deps,
        }
    }

    /// Match this pattern at a specific group node.
    pub fn match_group_node(
        &self,
        ctx: &OptContext<'_>,
        gn: OptGroupNodeId,
    ) -> Option<MatchedResult> {
        if !self.kinds.matches(ctx.plan_of(gn).kind()) {
            return None;
        }
        if self.deps.is_empty() {
            return Some(MatchedResult {
                node: gn,
                dependencies: vec![],
            });
        }
        let deps = ctx.dependencies_of(gn);
        if deps.len() != self.deps.len() {
            return None;
        }
        let mut dependencies = Vec::with_capacity(self.deps.len());
        for (group, pattern) in deps.iter().zip(self.deps.iter()) {
            dependencies.push(pattern.match_group(ctx, *group)?);
        }
        Some(MatchedResult {
            node: gn,
            dependencies,
        })
    }

    /// A group matches when any of its candidates matches.
    pub fn match_group(
        &self,
        ctx: &OptContext<'_>,
        group: OptGroupId,
    ) -> Option<MatchedResult> {
        ctx.group_nodes_of(group)
            .iter()
            .find_map(|gn| self.match_group_node(ctx, *gn))
    }
}

/// The witness of a successful pattern match: one bound group node per
/// pattern level, positionally aligned with the pattern's children.
#[derive(Debug, Clone)]
pub struct MatchedResult {
    pub node: OptGroupNodeId,
    pub dependencies: Vec<MatchedResult>,
}

impl MatchedResult {
    /// Navigate by child indices; the leading 0 addresses the root, as in
    /// `matched.plan_node(&[0, 1])` for the second child of the root.
    pub fn result(&self, pos: &[usize]) -> &MatchedResult {
        debug_assert_eq!(pos.first(), Some(&0));
        let mut node = self;
        for p in &pos[1..] {
            node = &node.dependencies[*p];
        }
        node
    }

    pub fn plan_node(&self, ctx: &OptContext<'_>, pos: &[usize]) -> PlanNodeId {
        ctx.plan_id_of(self.result(pos).node)
    }

    pub fn root_plan_node(&self, ctx: &OptContext<'_>) -> PlanNodeId {
        ctx.plan_id_of(self.node)
    }

    /// The dependency groups at the leaves of the matched subtree: the
    /// groups a rewrite is expected to preserve.
    pub fn collect_boundary(&self, ctx: &OptContext<'_>, boundary: &mut Vec<OptGroupId>) {
        if self.dependencies.is_empty() {
            boundary.extend_from_slice(ctx.dependencies_of(self.node));
        } else {
            for dep in &self.dependencies {
                dep.collect_boundary(ctx, boundary);
            }
        }
    }
}

/// What a transform did to the matched group.
#[derive(Debug, Default)]
pub struct TransformResult {
    /// Remove only the currently matched group node.
    pub erase_curr: bool,
    /// Remove every group node in the group before inserting the new ones.
    pub erase_all: bool,
    pub new_group_nodes: Vec<OptGroupNodeId>,
}

impl TransformResult {
    /// Pattern matched but the rewrite declined.
    pub fn no_transform() -> Self {
        TransformResult::default()
    }

    pub fn erase_curr_with(new_group_nodes: Vec<OptGroupNodeId>) -> Self {
        TransformResult {
            erase_curr: true,
            erase_all: false,
            new_group_nodes,
        }
    }

    /// `erase_all` subsumes `erase_curr`; the constructor normalizes the
    /// combination so downstream code only ever sees one flag set.
    pub fn erase_all_with(new_group_nodes: Vec<OptGroupNodeId>) -> Self {
        TransformResult {
            erase_curr: false,
            erase_all: true,
            new_group_nodes,
        }
    }
}

/// A rewrite rule: structural pattern, optional semantic gate, fallible
/// transform.
pub trait OptRule: Send + Sync {
    fn pattern(&self) -> &Pattern;

    /// Extra conditions beyond the pattern. Overrides should call
    /// [`default_match`] first to keep the data-flow check.
    fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
        default_match(ctx, matched)
    }

    fn transform(&self, ctx: &mut OptContext<'_>, matched: &MatchedResult)
        -> Result<TransformResult>;

    fn name(&self) -> &'static str;
}

/// The base `match` implementation: data-flow must mirror the matched
/// control flow, and intermediate results must have exactly their matched
/// consumer.
pub fn default_match(ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
    let root_var = ctx.plan_of(matched.node).output_var().to_owned();
    check_dataflow_deps(ctx, matched, &root_var, true)
}

fn check_dataflow_deps(
    ctx: &OptContext<'_>,
    matched: &MatchedResult,
    var: &str,
    is_root: bool,
) -> bool {
    let plan = ctx.plan_of(matched.node);
    if plan.output_var() != var {
        return false;
    }

    // Every memoized reader of an intermediate variable must be a group
    // node that depends on this group, otherwise rewriting the subtree
    // would break a consumer outside the matched shape.
    if !is_root {
        let Some(out_var) = ctx.qctx().symbols().get_var(var) else {
            return false;
        };
        let group = ctx.group_of(matched.node);
        for reader in &out_var.read_by {
            let Some(reader_gn) = ctx.find_group_node_by_plan_id(*reader) else {
                continue;
            };
            if !ctx.dependencies_of(reader_gn).contains(&group) {
                return false;
            }
        }
    }

    if matched.dependencies.is_empty() {
        return true;
    }
    debug_assert_eq!(
        matched.dependencies.len(),
        ctx.dependencies_of(matched.node).len()
    );
    let plan = ctx.plan_of(matched.node);
    let input_vars: Vec<String> = plan.input_vars().to_vec();
    for (i, dep) in matched.dependencies.iter().enumerate() {
        let Some(input_var) = input_vars.get(i) else {
            return false;
        };
        if !check_dataflow_deps(ctx, dep, input_var, false) {
            return false;
        }
    }
    true
}

/// An ordered collection of rules applied together. Iteration order is the
/// insertion order, which makes optimization output deterministic.
pub struct RuleSet {
    name: &'static str,
    rules: Vec<Arc<dyn OptRule>>,
}

impl RuleSet {
    pub fn new(name: &'static str) -> Self {
        RuleSet {
            name,
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_rule(mut self, rule: Arc<dyn OptRule>) -> Self {
        debug_assert!(
            !self.rules.iter().any(|r| r.name() == rule.name()),
            "rule set {} already contains {}",
            self.name,
            rule.name()
        );
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Arc<dyn OptRule>] {
        &self.rules
    }
}
