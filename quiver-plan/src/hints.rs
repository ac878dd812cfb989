//! Storage-facing hint types: how an index scan seeks, which rows may
//! leave an operator, which properties travel with an edge.

use serde::{Deserialize, Serialize};

use crate::expr::ExprRef;
use crate::meta::{EdgeType, IndexId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    Prefix,
    Range,
}

/// One per-column seek instruction for the storage layer. `Prefix` hints
/// carry an equality value in `begin_value`; `Range` hints carry half-open
/// or closed bounds with the include flags set from the comparators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumnHint {
    pub column_name: String,
    pub scan_kind: ScanKind,
    pub begin_value: Option<Value>,
    pub end_value: Option<Value>,
    pub include_begin: bool,
    pub include_end: bool,
}

impl IndexColumnHint {
    pub fn prefix(column_name: impl Into<String>, value: Value) -> Self {
        IndexColumnHint {
            column_name: column_name.into(),
            scan_kind: ScanKind::Prefix,
            begin_value: Some(value),
            end_value: None,
            include_begin: true,
            include_end: false,
        }
    }
}

/// The chosen (index id, column hints, residual filter) for one index scan.
/// A scan executes the union of its query contexts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexQueryContext {
    pub index_id: Option<IndexId>,
    /// Re-check filter evaluated by storage on each fetched row.
    pub filter: Option<ExprRef>,
    pub column_hints: Vec<IndexColumnHint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Storage-side ordering request attached to an index scan by top-N
/// pushdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub pos: usize,
    pub direction: OrderDirection,
}

/// Which edge type (signed: negative means reversed direction) and which
/// of its properties an exploration fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProp {
    pub edge_type: EdgeType,
    pub props: Vec<String>,
}

impl EdgeProp {
    pub fn new(edge_type: EdgeType, props: Vec<String>) -> Self {
        EdgeProp { edge_type, props }
    }
}
