//! Plan nodes: a kind discriminant over a shared node struct, with the
//! per-kind payload in [`NodeDetail`]. Nodes are owned by the
//! [`QueryContext`](crate::context::QueryContext) arena and addressed by
//! [`PlanNodeId`]; once a node enters the optimizer's memo it is treated as
//! immutable except through the context's mutation helpers.

pub mod detail;

use std::fmt::Display;

use strum::Display as StrumDisplay;

pub use detail::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct PlanNodeId(pub i64);

impl Display for PlanNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
pub enum PlanKind {
    /// Wildcard in patterns; never the kind of a real node.
    Unknown,
    Start,
    ValueTable,
    Argument,
    Filter,
    Project,
    Sort,
    TopN,
    Limit,
    Sample,
    Dedup,
    DataCollect,
    HashInnerJoin,
    HashLeftJoin,
    CrossJoin,
    Loop,
    Select,
    GetNeighbors,
    GetVertices,
    GetEdges,
    GetDstBySrc,
    Traverse,
    AppendVertices,
    ExpandAll,
    AllPaths,
    BfsShortest,
    MultiShortestPath,
    ScanVertices,
    ScanEdges,
    IndexScan,
    TagIndexFullScan,
    TagIndexPrefixScan,
    TagIndexRangeScan,
    EdgeIndexFullScan,
    EdgeIndexPrefixScan,
    EdgeIndexRangeScan,
    FulltextIndexScan,
    VectorIndexScan,
}

impl PlanKind {
    /// All kinds carrying an [`IndexScanDetail`] payload.
    pub fn is_index_scan(&self) -> bool {
        matches!(
            self,
            PlanKind::IndexScan
                | PlanKind::TagIndexFullScan
                | PlanKind::TagIndexPrefixScan
                | PlanKind::TagIndexRangeScan
                | PlanKind::EdgeIndexFullScan
                | PlanKind::EdgeIndexPrefixScan
                | PlanKind::EdgeIndexRangeScan
        )
    }

    pub fn is_join(&self) -> bool {
        matches!(
            self,
            PlanKind::HashInnerJoin | PlanKind::HashLeftJoin | PlanKind::CrossJoin
        )
    }
}

macro_rules! detail_accessors {
    ($( $fn_name:ident / $fn_name_mut:ident -> $variant:ident ( $ty:ty ) ),* $(,)?) => {
        impl PlanNode {
            $(
                pub fn $fn_name(&self) -> Option<&$ty> {
                    match &self.detail {
                        NodeDetail::$variant(d) => Some(d),
                        _ => None,
                    }
                }

                pub fn $fn_name_mut(&mut self) -> Option<&mut $ty> {
                    match &mut self.detail {
                        NodeDetail::$variant(d) => Some(d),
                        _ => None,
                    }
                }
            )*
        }
    };
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub(crate) id: PlanNodeId,
    pub(crate) kind: PlanKind,
    pub(crate) detail: NodeDetail,
    /// Positional inputs; `None` until a rule or the extraction pass wires
    /// the slot.
    pub(crate) deps: Vec<Option<PlanNodeId>>,
    pub(crate) input_vars: Vec<String>,
    pub(crate) output_var: String,
    pub(crate) cost: f64,
}

impl PlanNode {
    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn detail(&self) -> &NodeDetail {
        &self.detail
    }

    pub fn detail_mut(&mut self) -> &mut NodeDetail {
        &mut self.detail
    }

    pub fn deps(&self) -> &[Option<PlanNodeId>] {
        &self.deps
    }

    pub fn num_deps(&self) -> usize {
        self.deps.len()
    }

    pub fn dep(&self, i: usize) -> Option<PlanNodeId> {
        self.deps.get(i).copied().flatten()
    }

    pub fn set_dep(&mut self, i: usize, dep: PlanNodeId) {
        self.deps[i] = Some(dep);
    }

    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    pub fn input_vars(&self) -> &[String] {
        &self.input_vars
    }

    pub fn input_var(&self, i: usize) -> Option<&str> {
        self.input_vars.get(i).map(|s| s.as_str())
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Loop body / Select branches, in body order.
    pub fn bodies(&self) -> Vec<PlanNodeId> {
        match &self.detail {
            NodeDetail::Loop { body, .. } => body.iter().copied().collect(),
            NodeDetail::Select {
                then_body,
                else_body,
                ..
            } => then_body.iter().chain(else_body.iter()).copied().collect(),
            _ => vec![],
        }
    }

    pub fn set_body(&mut self, node: PlanNodeId) {
        if let NodeDetail::Loop { body, .. } = &mut self.detail {
            *body = Some(node);
        }
    }

    pub fn set_if(&mut self, node: PlanNodeId) {
        if let NodeDetail::Select { then_body, .. } = &mut self.detail {
            *then_body = Some(node);
        }
    }

    pub fn set_else(&mut self, node: PlanNodeId) {
        if let NodeDetail::Select { else_body, .. } = &mut self.detail {
            *else_body = Some(node);
        }
    }

    /// Storage-level row cap shared by the exploration/scan node family;
    /// -1 means unbounded.
    pub fn scan_limit(&self) -> Option<i64> {
        match &self.detail {
            NodeDetail::GetNeighbors(d) => Some(d.limit),
            NodeDetail::GetVertices(d) => Some(d.limit),
            NodeDetail::GetEdges(d) => Some(d.limit),
            NodeDetail::Traverse(d) => Some(d.limit),
            NodeDetail::AppendVertices(d) => Some(d.limit),
            NodeDetail::ExpandAll(d) => Some(d.limit),
            NodeDetail::AllPaths { limit, .. } => Some(*limit),
            NodeDetail::ScanVertices(d) => Some(d.limit),
            NodeDetail::ScanEdges(d) => Some(d.limit),
            NodeDetail::IndexScan(d) => Some(d.limit),
            _ => None,
        }
    }

    pub fn set_scan_limit(&mut self, limit: i64) {
        match &mut self.detail {
            NodeDetail::GetNeighbors(d) => d.limit = limit,
            NodeDetail::GetVertices(d) => d.limit = limit,
            NodeDetail::GetEdges(d) => d.limit = limit,
            NodeDetail::Traverse(d) => d.limit = limit,
            NodeDetail::AppendVertices(d) => d.limit = limit,
            NodeDetail::ExpandAll(d) => d.limit = limit,
            NodeDetail::AllPaths { limit: l, .. } => *l = limit,
            NodeDetail::ScanVertices(d) => d.limit = limit,
            NodeDetail::ScanEdges(d) => d.limit = limit,
            NodeDetail::IndexScan(d) => d.limit = limit,
            _ => {}
        }
    }

    /// Storage-side row filter of the exploration/scan node family.
    pub fn storage_filter(&self) -> Option<&crate::expr::ExprRef> {
        match &self.detail {
            NodeDetail::GetNeighbors(d) => d.filter.as_ref(),
            NodeDetail::GetVertices(d) => d.filter.as_ref(),
            NodeDetail::GetEdges(d) => d.filter.as_ref(),
            NodeDetail::Traverse(d) => d.filter.as_ref(),
            NodeDetail::AppendVertices(d) => d.filter.as_ref(),
            NodeDetail::ExpandAll(d) => d.filter.as_ref(),
            NodeDetail::AllPaths { filter, .. } => filter.as_ref(),
            NodeDetail::ScanVertices(d) => d.filter.as_ref(),
            NodeDetail::ScanEdges(d) => d.filter.as_ref(),
            _ => None,
        }
    }

    pub fn set_storage_filter(&mut self, new_filter: Option<crate::expr::ExprRef>) {
        match &mut self.detail {
            NodeDetail::GetNeighbors(d) => d.filter = new_filter,
            NodeDetail::GetVertices(d) => d.filter = new_filter,
            NodeDetail::GetEdges(d) => d.filter = new_filter,
            NodeDetail::Traverse(d) => d.filter = new_filter,
            NodeDetail::AppendVertices(d) => d.filter = new_filter,
            NodeDetail::ExpandAll(d) => d.filter = new_filter,
            NodeDetail::AllPaths { filter, .. } => *filter = new_filter,
            NodeDetail::ScanVertices(d) => d.filter = new_filter,
            NodeDetail::ScanEdges(d) => d.filter = new_filter,
            _ => {}
        }
    }
}

detail_accessors! {
    as_filter / as_filter_mut -> Filter(FilterDetail),
    as_project / as_project_mut -> Project(ProjectDetail),
    as_hash_inner_join / as_hash_inner_join_mut -> HashInnerJoin(JoinDetail),
    as_hash_left_join / as_hash_left_join_mut -> HashLeftJoin(JoinDetail),
    as_get_neighbors / as_get_neighbors_mut -> GetNeighbors(GetNeighborsDetail),
    as_get_vertices / as_get_vertices_mut -> GetVertices(GetVerticesDetail),
    as_get_edges / as_get_edges_mut -> GetEdges(GetEdgesDetail),
    as_traverse / as_traverse_mut -> Traverse(TraverseDetail),
    as_append_vertices / as_append_vertices_mut -> AppendVertices(AppendVerticesDetail),
    as_expand_all / as_expand_all_mut -> ExpandAll(ExpandAllDetail),
    as_scan_vertices / as_scan_vertices_mut -> ScanVertices(ScanVerticesDetail),
    as_scan_edges / as_scan_edges_mut -> ScanEdges(ScanEdgesDetail),
    as_index_scan / as_index_scan_mut -> IndexScan(IndexScanDetail),
}

impl PlanNode {
    /// Either join detail regardless of join kind.
    pub fn as_join(&self) -> Option<&JoinDetail> {
        match &self.detail {
            NodeDetail::HashInnerJoin(d) | NodeDetail::HashLeftJoin(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_limit(&self) -> Option<(i64, i64)> {
        match self.detail {
            NodeDetail::Limit { offset, count } => Some((offset, count)),
            _ => None,
        }
    }

    pub fn as_sort_factors(&self) -> Option<&[SortFactor]> {
        match &self.detail {
            NodeDetail::Sort { factors } => Some(factors.as_slice()),
            NodeDetail::TopN { factors, .. } => Some(factors.as_slice()),
            _ => None,
        }
    }
}
