//! Kind-specific payloads of plan nodes.
//!
//! The seven index-scan kinds share one payload; the concrete kind lives on
//! the node itself so specializing a full scan into a prefix/range scan is
//! a kind change plus hint rewrite, not a payload migration.

use std::collections::HashMap;

use crate::expr::ExprRef;
use crate::hints::{EdgeProp, IndexQueryContext, OrderBy};
use crate::meta::{SchemaId, SpaceId};
use crate::plan::PlanNodeId;
use crate::value::Value;

/// One projected column: expression plus output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldColumn {
    pub expr: ExprRef,
    pub alias: String,
}

impl YieldColumn {
    pub fn new(expr: ExprRef, alias: impl Into<String>) -> Self {
        YieldColumn {
            expr,
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortFactor {
    /// Index into the input's column list.
    pub index: usize,
    pub direction: crate::hints::OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCollectKind {
    RowBasedMove,
    MToN,
    PathList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDetail {
    pub condition: ExprRef,
    pub always_false: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDetail {
    pub columns: Vec<YieldColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinDetail {
    pub hash_keys: Vec<ExprRef>,
    pub probe_keys: Vec<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetNeighborsDetail {
    pub space: SpaceId,
    pub src: ExprRef,
    pub edge_props: Vec<EdgeProp>,
    pub dedup: bool,
    pub random: bool,
    pub limit: i64,
    pub filter: Option<ExprRef>,
    pub edge_filter: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetVerticesDetail {
    pub space: SpaceId,
    pub src: ExprRef,
    pub dedup: bool,
    pub limit: i64,
    pub filter: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetEdgesDetail {
    pub space: SpaceId,
    pub dedup: bool,
    pub limit: i64,
    pub filter: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraverseDetail {
    pub space: SpaceId,
    pub step_range: Option<StepRange>,
    pub edge_props: Vec<EdgeProp>,
    /// Vertex predicate not yet lowered to storage.
    pub v_filter: Option<ExprRef>,
    /// Edge predicate evaluated storage-side during expansion.
    pub e_filter: Option<ExprRef>,
    /// Predicate applied to the starting vertices only.
    pub first_step_filter: Option<ExprRef>,
    /// Storage-side row filter.
    pub filter: Option<ExprRef>,
    pub dedup: bool,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppendVerticesDetail {
    pub space: SpaceId,
    pub src: ExprRef,
    pub v_filter: Option<ExprRef>,
    pub filter: Option<ExprRef>,
    pub dedup: bool,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandAllDetail {
    pub space: SpaceId,
    pub edge_props: Vec<EdgeProp>,
    pub filter: Option<ExprRef>,
    pub dedup: bool,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerticesDetail {
    pub space: SpaceId,
    pub filter: Option<ExprRef>,
    pub dedup: bool,
    pub limit: i64,
    pub always_false: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanEdgesDetail {
    pub space: SpaceId,
    pub edge_props: Vec<EdgeProp>,
    pub filter: Option<ExprRef>,
    pub dedup: bool,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanDetail {
    pub space: SpaceId,
    pub is_edge: bool,
    pub schema_id: SchemaId,
    /// Tag or edge name the scan was planned against.
    pub schema_name: String,
    /// Executed as the union of the contexts.
    pub query_contexts: Vec<IndexQueryContext>,
    pub limit: i64,
    pub order_by: Vec<OrderBy>,
    /// Columns the index itself can return.
    pub return_columns: Vec<String>,
    /// Output column name -> index return column name.
    pub output_to_return: HashMap<String, String>,
    pub always_false: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeDetail {
    Start,
    /// Emits a constant dataset; the empty-result replacement target.
    ValueTable { rows: Vec<Vec<Value>> },
    Argument,
    Filter(FilterDetail),
    Project(ProjectDetail),
    Sort { factors: Vec<SortFactor> },
    TopN {
        factors: Vec<SortFactor>,
        offset: i64,
        count: i64,
    },
    Limit { offset: i64, count: i64 },
    Sample { count: i64 },
    Dedup,
    DataCollect {
        collect_kind: DataCollectKind,
        distinct: bool,
    },
    HashInnerJoin(JoinDetail),
    HashLeftJoin(JoinDetail),
    CrossJoin,
    Loop {
        condition: ExprRef,
        body: Option<PlanNodeId>,
    },
    Select {
        condition: ExprRef,
        then_body: Option<PlanNodeId>,
        else_body: Option<PlanNodeId>,
    },
    GetNeighbors(GetNeighborsDetail),
    GetVertices(GetVerticesDetail),
    GetEdges(GetEdgesDetail),
    GetDstBySrc { space: SpaceId, src: ExprRef },
    Traverse(TraverseDetail),
    AppendVertices(AppendVerticesDetail),
    ExpandAll(ExpandAllDetail),
    AllPaths {
        space: SpaceId,
        filter: Option<ExprRef>,
        limit: i64,
        no_loop: bool,
    },
    BfsShortest { limit: i64, steps: usize },
    MultiShortestPath { limit: i64, steps: usize },
    ScanVertices(ScanVerticesDetail),
    ScanEdges(ScanEdgesDetail),
    IndexScan(IndexScanDetail),
    FulltextIndexScan {
        query: String,
        limit: i64,
        offset: i64,
    },
    VectorIndexScan { limit: i64, offset: i64 },
}
