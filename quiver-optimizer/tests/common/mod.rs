//! Shared fixtures: a small in-memory catalog plus plan-node builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use quiver_plan::expr::{Expr, ExprRef};
use quiver_plan::hints::{EdgeProp, OrderDirection};
use quiver_plan::meta::{
    ColumnDef, GeoShape, IndexItem, MemoryCatalog, PropertyType, Schema, SchemaId,
};
use quiver_plan::plan::{
    AppendVerticesDetail, GetNeighborsDetail, IndexScanDetail, ScanEdgesDetail,
    ScanVerticesDetail, SortFactor, TraverseDetail, YieldColumn,
};
use quiver_plan::{NodeDetail, PlanKind, PlanNodeId, QueryContext};

pub const SPACE: i32 = 1;
pub const TAG_T: i32 = 2;
pub const TAG_PLACE: i32 = 5;
pub const IDX_P1_P2: i64 = 1;
pub const IDX_P1: i64 = 2;
pub const IDX_GEO: i64 = 7;
pub const ASC: OrderDirection = OrderDirection::Ascending;

pub fn asc(index: usize) -> SortFactor {
    SortFactor {
        index,
        direction: ASC,
    }
}

fn base_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog.add_tag(
        SPACE,
        "t",
        TAG_T,
        Schema {
            columns: vec![
                ColumnDef::new("p1", PropertyType::Int64),
                ColumnDef::new("p2", PropertyType::Int64),
            ],
        },
    );
    catalog.add_edge(SPACE, "likes", 3);
    catalog.add_tag_index(
        SPACE,
        IndexItem {
            index_id: IDX_P1_P2,
            index_name: "i_p1_p2".into(),
            schema_id: SchemaId::Tag(TAG_T),
            fields: vec![
                ColumnDef::new("p1", PropertyType::Int64),
                ColumnDef::new("p2", PropertyType::Int64),
            ],
            index_params: None,
        },
    );
    catalog.add_tag_index(
        SPACE,
        IndexItem {
            index_id: IDX_P1,
            index_name: "i_p1".into(),
            schema_id: SchemaId::Tag(TAG_T),
            fields: vec![ColumnDef::new("p1", PropertyType::Int64)],
            index_params: None,
        },
    );
    catalog
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn qctx() -> QueryContext {
    init_tracing();
    QueryContext::new(SPACE, Arc::new(base_catalog()))
}

pub fn qctx_with_geo_index() -> QueryContext {
    init_tracing();
    let mut catalog = base_catalog();
    catalog.add_tag(
        SPACE,
        "place",
        TAG_PLACE,
        Schema {
            columns: vec![ColumnDef::new(
                "geo",
                PropertyType::Geography(GeoShape::Point),
            )],
        },
    );
    catalog.add_tag_index(
        SPACE,
        IndexItem {
            index_id: IDX_GEO,
            index_name: "i_geo".into(),
            schema_id: SchemaId::Tag(TAG_PLACE),
            fields: vec![ColumnDef::new(
                "geo",
                PropertyType::Geography(GeoShape::Point),
            )],
            index_params: None,
        },
    );
    QueryContext::new(SPACE, Arc::new(catalog))
}

pub fn argument(q: &mut QueryContext, cols: &[&str]) -> PlanNodeId {
    let id = q.make_argument();
    q.set_col_names(id, cols.iter().map(|c| c.to_string()).collect());
    id
}

pub fn filter(q: &mut QueryContext, input: PlanNodeId, condition: ExprRef) -> PlanNodeId {
    q.make_filter(Some(input), condition)
}

pub fn project(q: &mut QueryContext, input: PlanNodeId, columns: Vec<YieldColumn>) -> PlanNodeId {
    q.make_project(Some(input), columns)
}

pub fn limit(q: &mut QueryContext, input: PlanNodeId, offset: i64, count: i64) -> PlanNodeId {
    q.make_limit(Some(input), offset, count)
}

pub fn sort_by(q: &mut QueryContext, input: PlanNodeId, factors: Vec<SortFactor>) -> PlanNodeId {
    q.make_node(PlanKind::Sort, NodeDetail::Sort { factors }, &[Some(input)])
}

pub fn sample(q: &mut QueryContext, input: PlanNodeId, count: i64) -> PlanNodeId {
    q.make_node(PlanKind::Sample, NodeDetail::Sample { count }, &[Some(input)])
}

pub fn scan_vertices_from(q: &mut QueryContext, input: PlanNodeId, cols: &[&str]) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::ScanVertices,
        NodeDetail::ScanVertices(ScanVerticesDetail {
            space: SPACE,
            filter: None,
            dedup: false,
            limit: -1,
            always_false: false,
        }),
        &[Some(input)],
    );
    q.set_col_names(id, cols.iter().map(|c| c.to_string()).collect());
    id
}

pub fn scan_vertices(q: &mut QueryContext, cols: &[&str]) -> PlanNodeId {
    let start = q.make_start();
    scan_vertices_from(q, start, cols)
}

pub fn scan_edges(q: &mut QueryContext, limit: i64) -> PlanNodeId {
    let start = q.make_start();
    let id = q.make_node(
        PlanKind::ScanEdges,
        NodeDetail::ScanEdges(ScanEdgesDetail {
            space: SPACE,
            edge_props: vec![EdgeProp::new(3, vec![])],
            filter: None,
            dedup: false,
            limit,
        }),
        &[Some(start)],
    );
    q.set_col_names(id, vec!["_edge".into()]);
    id
}

pub fn traverse(q: &mut QueryContext, input: PlanNodeId, cols: &[&str]) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::Traverse,
        NodeDetail::Traverse(TraverseDetail {
            space: SPACE,
            step_range: None,
            edge_props: vec![EdgeProp::new(3, vec![])],
            v_filter: None,
            e_filter: None,
            first_step_filter: None,
            filter: None,
            dedup: false,
            limit: -1,
        }),
        &[Some(input)],
    );
    q.set_col_names(id, cols.iter().map(|c| c.to_string()).collect());
    id
}

pub fn append_vertices(q: &mut QueryContext, input: PlanNodeId, cols: &[&str]) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::AppendVertices,
        NodeDetail::AppendVertices(AppendVerticesDetail {
            space: SPACE,
            src: Expr::input_prop("_vid"),
            v_filter: None,
            filter: None,
            dedup: false,
            limit: -1,
        }),
        &[Some(input)],
    );
    q.set_col_names(id, cols.iter().map(|c| c.to_string()).collect());
    id
}

pub fn get_neighbors(q: &mut QueryContext, input: PlanNodeId, cols: &[&str]) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::GetNeighbors,
        NodeDetail::GetNeighbors(GetNeighborsDetail {
            space: SPACE,
            src: Expr::input_prop("_vid"),
            edge_props: vec![EdgeProp::new(3, vec![])],
            dedup: false,
            random: false,
            limit: -1,
            filter: None,
            edge_filter: None,
        }),
        &[Some(input)],
    );
    q.set_col_names(id, cols.iter().map(|c| c.to_string()).collect());
    id
}

fn index_scan_detail(schema: SchemaId, name: &str, return_columns: &[&str]) -> IndexScanDetail {
    IndexScanDetail {
        space: SPACE,
        is_edge: false,
        schema_id: schema,
        schema_name: name.into(),
        query_contexts: vec![],
        limit: -1,
        order_by: vec![],
        return_columns: return_columns.iter().map(|c| c.to_string()).collect(),
        output_to_return: return_columns
            .iter()
            .map(|c| (c.to_string(), c.to_string()))
            .collect::<HashMap<_, _>>(),
        always_false: false,
    }
}

pub fn tag_index_full_scan(q: &mut QueryContext, input: PlanNodeId) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::TagIndexFullScan,
        NodeDetail::IndexScan(index_scan_detail(SchemaId::Tag(TAG_T), "t", &["p1", "p2"])),
        &[Some(input)],
    );
    q.set_col_names(id, vec!["p1".into(), "p2".into()]);
    id
}

pub fn geo_index_full_scan(q: &mut QueryContext, input: PlanNodeId) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::TagIndexFullScan,
        NodeDetail::IndexScan(index_scan_detail(
            SchemaId::Tag(TAG_PLACE),
            "place",
            &["geo"],
        )),
        &[Some(input)],
    );
    q.set_col_names(id, vec!["geo".into()]);
    id
}

pub fn fulltext_index_scan(q: &mut QueryContext, input: PlanNodeId) -> PlanNodeId {
    let id = q.make_node(
        PlanKind::FulltextIndexScan,
        NodeDetail::FulltextIndexScan {
            query: "hello".into(),
            limit: -1,
            offset: -1,
        },
        &[Some(input)],
    );
    q.set_col_names(id, vec!["_score".into()]);
    id
}

/// Structural signature of a plan, ignoring node ids and variable names.
pub fn plan_shape(q: &QueryContext, root: PlanNodeId) -> String {
    let node = q.plan_node(root);
    let mut shape = format!("{}", node.kind());
    if node.num_deps() > 0 {
        shape.push('(');
        for i in 0..node.num_deps() {
            if i > 0 {
                shape.push(' ');
            }
            match node.dep(i) {
                Some(dep) => shape.push_str(&plan_shape(q, dep)),
                None => shape.push('_'),
            }
        }
        shape.push(')');
    }
    shape
}
