//! Schema and index metadata, as served by the meta service cache.
//!
//! The optimizer treats every lookup here as a cheap cached read; nothing
//! in this module performs I/O.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub type SpaceId = i32;
pub type TagId = i32;
pub type EdgeType = i32;
pub type IndexId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoShape {
    Any,
    Point,
    LineString,
    Polygon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    Int64,
    Double,
    String(usize),
    Timestamp,
    Geography(GeoShape),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub prop_type: PropertyType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, prop_type: PropertyType) -> Self {
        ColumnDef {
            name: name.into(),
            prop_type,
        }
    }
}

/// Which schema an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaId {
    Tag(TagId),
    Edge(EdgeType),
}

/// Geo-index construction parameters stored with the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub s2_max_level: Option<u8>,
    pub s2_max_cells: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub index_id: IndexId,
    pub index_name: String,
    pub schema_id: SchemaId,
    pub fields: Vec<ColumnDef>,
    pub index_params: Option<IndexParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

/// Read-only metadata access used during index selection. Implementations
/// serve from an in-process cache.
pub trait MetaCatalog: Send + Sync {
    fn tag_indexes(&self, space: SpaceId) -> Vec<Arc<IndexItem>>;
    fn edge_indexes(&self, space: SpaceId) -> Vec<Arc<IndexItem>>;
    fn tag_id(&self, space: SpaceId, tag_name: &str) -> Option<TagId>;
    fn edge_name(&self, space: SpaceId, edge_type: EdgeType) -> Option<String>;
    fn tag_schema(&self, space: SpaceId, tag_id: TagId) -> Option<Arc<Schema>>;
}

/// In-memory catalog, used by tests and by embedded deployments.
#[derive(Default)]
pub struct MemoryCatalog {
    tag_indexes: HashMap<SpaceId, Vec<Arc<IndexItem>>>,
    edge_indexes: HashMap<SpaceId, Vec<Arc<IndexItem>>>,
    tags: HashMap<(SpaceId, String), TagId>,
    edges: HashMap<(SpaceId, EdgeType), String>,
    tag_schemas: HashMap<(SpaceId, TagId), Arc<Schema>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tag(&mut self, space: SpaceId, name: &str, id: TagId, schema: Schema) {
        self.tags.insert((space, name.to_owned()), id);
        self.tag_schemas.insert((space, id), Arc::new(schema));
    }

    pub fn add_edge(&mut self, space: SpaceId, name: &str, edge_type: EdgeType) {
        self.edges.insert((space, edge_type), name.to_owned());
    }

    pub fn add_tag_index(&mut self, space: SpaceId, index: IndexItem) {
        self.tag_indexes
            .entry(space)
            .or_default()
            .push(Arc::new(index));
    }

    pub fn add_edge_index(&mut self, space: SpaceId, index: IndexItem) {
        self.edge_indexes
            .entry(space)
            .or_default()
            .push(Arc::new(index));
    }
}

impl MetaCatalog for MemoryCatalog {
    fn tag_indexes(&self, space: SpaceId) -> Vec<Arc<IndexItem>> {
        self.tag_indexes.get(&space).cloned().unwrap_or_default()
    }

    fn edge_indexes(&self, space: SpaceId) -> Vec<Arc<IndexItem>> {
        self.edge_indexes.get(&space).cloned().unwrap_or_default()
    }

    fn tag_id(&self, space: SpaceId, tag_name: &str) -> Option<TagId> {
        self.tags.get(&(space, tag_name.to_owned())).copied()
    }

    fn edge_name(&self, space: SpaceId, edge_type: EdgeType) -> Option<String> {
        self.edges.get(&(space, edge_type)).cloned()
    }

    fn tag_schema(&self, space: SpaceId, tag_id: TagId) -> Option<Arc<Schema>> {
        self.tag_schemas.get(&(space, tag_id)).cloned()
    }
}
