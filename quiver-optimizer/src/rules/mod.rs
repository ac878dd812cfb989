//! The rewrite rule library and its two standard rule sets.
//!
//! `default_rules` performs index selection and runs first;
//! `query_rules` holds every other logical rewrite. Both sets fix their
//! rule order explicitly; exploration visits rules in exactly this
//! order, which keeps optimization output deterministic.

mod eliminate;
mod filter_join_pushdown;
mod filter_pushdown;
mod fulltext_vector;
mod get_dst_by_src;
mod get_edges_transform;
mod geo_index_scan;
mod index_scan;
mod join_simplify;
mod limit_pushdown;
mod merge_dedup;
mod project;
mod topn_index;
mod union_index_scan;

use quiver_plan::expr::{Expr, ExprRef};
use quiver_plan::PlanNodeId;

use crate::context::OptContext;
use crate::expr_rewrite::{collect_exprs, PROPERTY_KINDS};
use crate::rule::RuleSet;

pub use eliminate::{
    CombineFilterRule, EliminateAppendVerticesRule, EliminateFilterRule, InvalidFilterRule,
};
pub use filter_join_pushdown::{
    PushFilterDownCrossJoinRule, PushFilterDownHashInnerJoinRule, PushFilterDownHashLeftJoinRule,
};
pub use filter_pushdown::{
    PushFilterDownAllPathsRule, PushFilterDownAppendVerticesRule, PushFilterDownExpandAllRule,
    PushFilterDownGetNbrsRule, PushFilterDownNodeRule, PushFilterDownProjectRule,
    PushFilterDownScanVerticesRule, PushFilterDownTraverseRule,
    PushFilterThroughAppendVerticesRule, PushVFilterDownScanVerticesRule,
};
pub use fulltext_vector::{
    PushLimitDownFulltextIndexScanRule, PushLimitDownFulltextIndexScanRule2,
    PushLimitDownVectorIndexScanRule, PushLimitDownVectorIndexScanRule2,
};
pub use get_dst_by_src::RemoveProjectDedupBeforeGetDstBySrcRule;
pub use get_edges_transform::{
    GetEdgesTransformAppendVerticesLimitRule, GetEdgesTransformLimitRule, GetEdgesTransformRule,
};
pub use geo_index_scan::{GeoPredicateEdgeIndexScanRule, GeoPredicateTagIndexScanRule};
pub use index_scan::{
    EdgeIndexFullScanRule, IndexScanRule, OptimizeEdgeIndexScanByFilterRule,
    OptimizeTagIndexScanByFilterRule, TagIndexFullScanRule,
};
pub use join_simplify::{OptimizeLeftJoinPredicateRule, RemoveAppendVerticesBelowJoinRule};
pub use limit_pushdown::{
    PushLimitDownAllPathsRule, PushLimitDownEdgeIndexFullScanRule,
    PushLimitDownEdgeIndexPrefixScanRule, PushLimitDownEdgeIndexRangeScanRule,
    PushLimitDownGetEdgesRule, PushLimitDownGetNeighborsRule, PushLimitDownGetVerticesRule,
    PushLimitDownIndexScanRule, PushLimitDownProjectRule, PushLimitDownScanEdgesRule,
    PushLimitDownShortestPathRule, PushLimitDownTagIndexFullScanRule,
    PushLimitDownTagIndexPrefixScanRule, PushLimitDownTagIndexRangeScanRule,
    PushLimitDownTraverseRule, PushLimitDownExpandAllRule, PushSampleDownGetNeighborsRule,
    TopNRule,
};
pub use merge_dedup::{MergeGetNbrsAndDedupRule, MergeGetVerticesAndDedupRule};
pub use project::{CollapseProjectRule, RemoveNoopProjectRule};
pub use topn_index::{
    PushTopNDownEdgeIndexFullScanRule, PushTopNDownEdgeIndexPrefixScanRule,
    PushTopNDownEdgeIndexRangeScanRule, PushTopNDownTagIndexFullScanRule,
    PushTopNDownTagIndexPrefixScanRule, PushTopNDownTagIndexRangeScanRule,
};
pub use union_index_scan::{UnionAllEdgeIndexScanRule, UnionAllTagIndexScanRule};

/// The column storage uses for vertex ids.
pub(crate) const VID_COL: &str = "_vid";

/// Clone a plan node and point the copy at an existing output variable.
pub(crate) fn clone_with_output(
    ctx: &mut OptContext<'_>,
    node: PlanNodeId,
    output_var: &str,
) -> PlanNodeId {
    let cloned = ctx.qctx_mut().clone_plan_node(node);
    ctx.qctx_mut().set_output_var(cloned, output_var);
    cloned
}

/// Point a group node's plan at the output variables of its dependency
/// groups, slot by slot. Used after wiring a freshly built node onto
/// pre-existing groups.
pub(crate) fn align_input_vars(ctx: &mut OptContext<'_>, gn: crate::context::OptGroupNodeId) {
    let plan_id = ctx.plan_id_of(gn);
    let n_inputs = ctx.qctx().plan_node(plan_id).input_vars().len();
    let deps = ctx.dependencies_of(gn).to_vec();
    for (i, dep) in deps.into_iter().enumerate().take(n_inputs) {
        let var = ctx.group_output_var(dep).to_owned();
        if !var.is_empty() {
            ctx.qctx_mut().set_input_var_at(plan_id, i, &var);
        }
    }
}

/// Whether every property reference in the expression targets `alias`,
/// either as a plain column or through an `alias.tag.prop` access.
pub(crate) fn refs_only_alias(expr: &ExprRef, alias: &str) -> bool {
    let props = collect_exprs(expr, PROPERTY_KINDS);
    if props.is_empty() {
        return false;
    }
    props.iter().all(|p| match p.as_ref() {
        Expr::AliasTagProp { alias: a, .. } => a == alias,
        _ => p.prop_name() == Some(alias),
    })
}

/// Index-selection rules; specialized selectors run before the full-scan
/// fallback.
pub fn default_rules() -> RuleSet {
    RuleSet::new("DefaultRuleSet")
        .add_rule(IndexScanRule::new())
        .add_rule(GeoPredicateTagIndexScanRule::new())
        .add_rule(GeoPredicateEdgeIndexScanRule::new())
        .add_rule(UnionAllTagIndexScanRule::new())
        .add_rule(UnionAllEdgeIndexScanRule::new())
        .add_rule(OptimizeTagIndexScanByFilterRule::new())
        .add_rule(OptimizeEdgeIndexScanByFilterRule::new())
        .add_rule(TagIndexFullScanRule::new())
        .add_rule(EdgeIndexFullScanRule::new())
        .add_rule(InvalidFilterRule::new())
}

/// All remaining logical rewrites.
pub fn query_rules() -> RuleSet {
    RuleSet::new("QueryRuleSet")
        .add_rule(EliminateFilterRule::new())
        .add_rule(CombineFilterRule::new())
        .add_rule(CollapseProjectRule::new())
        .add_rule(RemoveNoopProjectRule::new())
        .add_rule(EliminateAppendVerticesRule::new())
        .add_rule(RemoveAppendVerticesBelowJoinRule::new())
        .add_rule(OptimizeLeftJoinPredicateRule::new())
        .add_rule(RemoveProjectDedupBeforeGetDstBySrcRule::new())
        .add_rule(PushFilterDownProjectRule::new())
        .add_rule(PushFilterDownHashInnerJoinRule::new())
        .add_rule(PushFilterDownHashLeftJoinRule::new())
        .add_rule(PushFilterDownCrossJoinRule::new())
        .add_rule(PushFilterDownNodeRule::new())
        .add_rule(PushFilterDownTraverseRule::new())
        .add_rule(PushFilterDownAppendVerticesRule::new())
        .add_rule(PushFilterThroughAppendVerticesRule::new())
        .add_rule(PushVFilterDownScanVerticesRule::new())
        .add_rule(PushFilterDownScanVerticesRule::new())
        .add_rule(PushFilterDownGetNbrsRule::new())
        .add_rule(PushFilterDownExpandAllRule::new())
        .add_rule(PushFilterDownAllPathsRule::new())
        .add_rule(GetEdgesTransformAppendVerticesLimitRule::new())
        .add_rule(GetEdgesTransformLimitRule::new())
        .add_rule(GetEdgesTransformRule::new())
        .add_rule(TopNRule::new())
        .add_rule(PushLimitDownProjectRule::new())
        .add_rule(PushLimitDownGetNeighborsRule::new())
        .add_rule(PushLimitDownGetVerticesRule::new())
        .add_rule(PushLimitDownGetEdgesRule::new())
        .add_rule(PushLimitDownScanEdgesRule::new())
        .add_rule(PushLimitDownTraverseRule::new())
        .add_rule(PushLimitDownExpandAllRule::new())
        .add_rule(PushLimitDownAllPathsRule::new())
        .add_rule(PushLimitDownIndexScanRule::new())
        .add_rule(PushLimitDownTagIndexFullScanRule::new())
        .add_rule(PushLimitDownTagIndexPrefixScanRule::new())
        .add_rule(PushLimitDownTagIndexRangeScanRule::new())
        .add_rule(PushLimitDownEdgeIndexFullScanRule::new())
        .add_rule(PushLimitDownEdgeIndexPrefixScanRule::new())
        .add_rule(PushLimitDownEdgeIndexRangeScanRule::new())
        .add_rule(PushLimitDownFulltextIndexScanRule::new())
        .add_rule(PushLimitDownFulltextIndexScanRule2::new())
        .add_rule(PushLimitDownVectorIndexScanRule::new())
        .add_rule(PushLimitDownVectorIndexScanRule2::new())
        .add_rule(PushLimitDownShortestPathRule::new())
        .add_rule(PushTopNDownTagIndexFullScanRule::new())
        .add_rule(PushTopNDownTagIndexPrefixScanRule::new())
        .add_rule(PushTopNDownTagIndexRangeScanRule::new())
        .add_rule(PushTopNDownEdgeIndexFullScanRule::new())
        .add_rule(PushTopNDownEdgeIndexPrefixScanRule::new())
        .add_rule(PushTopNDownEdgeIndexRangeScanRule::new())
        .add_rule(PushSampleDownGetNeighborsRule::new())
        .add_rule(MergeGetVerticesAndDedupRule::new())
        .add_rule(MergeGetNbrsAndDedupRule::new())
}
