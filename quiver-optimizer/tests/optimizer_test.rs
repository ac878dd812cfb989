//! End-to-end optimizer scenarios over a small in-memory catalog.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use quiver_plan::expr::{Expr, LogicalOp};
use quiver_plan::hints::ScanKind;
use quiver_plan::plan::YieldColumn;
use quiver_plan::{NodeDetail, PlanKind, Value};
use quiver_optimizer::rules::{default_rules, query_rules};
use quiver_optimizer::Optimizer;

fn query_only_optimizer() -> Optimizer {
    Optimizer::new(vec![query_rules()])
}

#[test]
fn limit_over_sort_becomes_topn() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["c0", "c1"]);
    let sort = sort_by(&mut q, scan, vec![asc(0)]);
    let limit = limit(&mut q, sort, 0, 5);
    let limit_var = q.plan_node(limit).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, limit).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::TopN);
    assert_eq!(root.output_var(), limit_var);
    match root.detail() {
        NodeDetail::TopN {
            factors,
            offset,
            count,
        } => {
            assert_eq!(*offset, 0);
            assert_eq!(*count, 5);
            assert_eq!(factors.as_slice(), &[asc(0)]);
        }
        other => panic!("expected TopN detail, got {other:?}"),
    }
    assert_eq!(root.dep(0), Some(scan));
}

#[test]
fn limit_with_offset_keeps_sort() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["c0"]);
    let sort = sort_by(&mut q, scan, vec![asc(0)]);
    let limit = limit(&mut q, sort, 2, 5);

    let best = query_only_optimizer().find_best_plan(&mut q, limit).unwrap();
    assert_eq!(q.plan_node(best).kind(), PlanKind::Limit);
}

#[test]
fn stacked_filters_combine() {
    let mut q = qctx();
    let arg = argument(&mut q, &["a", "b"]);
    let lower = filter(
        &mut q,
        arg,
        Expr::lt(Expr::input_prop("b"), Expr::constant(2i64)),
    );
    let upper = filter(
        &mut q,
        lower,
        Expr::gt(Expr::input_prop("a"), Expr::constant(1i64)),
    );
    let upper_var = q.plan_node(upper).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, upper).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Filter);
    assert_eq!(root.output_var(), upper_var);
    let condition = &root.as_filter().unwrap().condition;
    match condition.as_ref() {
        Expr::Logical { op, operands } => {
            assert_eq!(*op, LogicalOp::And);
            assert_eq!(operands.len(), 2);
        }
        other => panic!("expected a conjunction, got {other}"),
    }
    assert_eq!(root.dep(0), Some(arg));
}

#[test]
fn three_filters_converge_to_one() {
    let mut q = qctx();
    let arg = argument(&mut q, &["a"]);
    let mut node = arg;
    for i in 0..3 {
        node = filter(
            &mut q,
            node,
            Expr::gt(Expr::input_prop("a"), Expr::constant(i as i64)),
        );
    }

    let best = query_only_optimizer().find_best_plan(&mut q, node).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Filter);
    assert_eq!(root.dep(0), Some(arg));
    match root.as_filter().unwrap().condition.as_ref() {
        Expr::Logical { operands, .. } => assert_eq!(operands.len(), 3),
        other => panic!("expected a conjunction, got {other}"),
    }
}

#[test]
fn filter_pushes_through_project() {
    let mut q = qctx();
    let arg = argument(&mut q, &["x", "y"]);
    let project = project(
        &mut q,
        arg,
        vec![
            YieldColumn::new(Expr::alias_tag_prop("v", "t", "x"), "a"),
            YieldColumn::new(Expr::alias_tag_prop("v", "t", "y"), "b"),
        ],
    );
    let f = filter(
        &mut q,
        project,
        Expr::gt(Expr::input_prop("a"), Expr::constant(3i64)),
    );
    let filter_var = q.plan_node(f).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Project);
    assert_eq!(root.output_var(), filter_var);

    let below = q.plan_node(root.dep(0).unwrap());
    assert_eq!(below.kind(), PlanKind::Filter);
    assert_eq!(
        below.as_filter().unwrap().condition,
        Expr::gt(Expr::alias_tag_prop("v", "t", "x"), Expr::constant(3i64))
    );
    assert_eq!(below.dep(0), Some(arg));
}

#[test]
fn conjunctive_tag_filter_becomes_prefix_scan() {
    let mut q = qctx();
    let start = q.make_start();
    let scan = tag_index_full_scan(&mut q, start);
    let cond = Expr::and(
        Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(1i64)),
        Expr::eq(Expr::tag_prop("t", "p2"), Expr::constant(2i64)),
    );
    let f = filter(&mut q, scan, cond);
    let filter_var = q.plan_node(f).output_var().to_owned();

    let optimizer = Optimizer::new(vec![default_rules(), query_rules()]);
    let best = optimizer.find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::TagIndexPrefixScan);
    assert_eq!(root.output_var(), filter_var);
    let detail = root.as_index_scan().unwrap();
    assert_eq!(detail.query_contexts.len(), 1);
    let ictx = &detail.query_contexts[0];
    assert_eq!(ictx.index_id, Some(IDX_P1_P2));
    assert_eq!(ictx.filter, None);
    let hints = &ictx.column_hints;
    assert_eq!(hints.len(), 2);
    assert!(hints.iter().all(|h| h.scan_kind == ScanKind::Prefix));
    assert_eq!(hints[0].begin_value, Some(Value::Int(1)));
    assert_eq!(hints[1].begin_value, Some(Value::Int(2)));
}

#[test]
fn or_filter_becomes_union_index_scan() {
    let mut q = qctx();
    let start = q.make_start();
    let scan = tag_index_full_scan(&mut q, start);
    let cond = Expr::or(
        Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(1i64)),
        Expr::eq(Expr::tag_prop("t", "p1"), Expr::constant(2i64)),
    );
    let f = filter(&mut q, scan, cond);

    let optimizer = Optimizer::new(vec![default_rules(), query_rules()]);
    let best = optimizer.find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::IndexScan);
    let detail = root.as_index_scan().unwrap();
    assert_eq!(detail.query_contexts.len(), 2);
    for ictx in &detail.query_contexts {
        assert!(ictx.index_id.is_some());
        assert_eq!(ictx.column_hints.len(), 1);
        assert_eq!(ictx.column_hints[0].scan_kind, ScanKind::Prefix);
    }
}

#[test]
fn in_filter_explodes_into_union_scan() {
    let mut q = qctx();
    let start = q.make_start();
    let scan = tag_index_full_scan(&mut q, start);
    let cond = Expr::in_list(
        Expr::tag_prop("t", "p1"),
        Expr::list(vec![
            Expr::constant(1i64),
            Expr::constant(2i64),
            Expr::constant(3i64),
        ]),
    );
    let f = filter(&mut q, scan, cond);

    let optimizer = Optimizer::new(vec![default_rules(), query_rules()]);
    let best = optimizer.find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::IndexScan);
    assert_eq!(root.as_index_scan().unwrap().query_contexts.len(), 3);
}

#[test]
fn constant_false_filter_becomes_empty_values() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a"]);
    let f = filter(&mut q, scan, Expr::constant(false));
    let filter_var = q.plan_node(f).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::ValueTable);
    assert_eq!(root.output_var(), filter_var);
    assert_eq!(q.col_names(best), ["a"]);
    let start = q.plan_node(root.dep(0).unwrap());
    assert_eq!(start.kind(), PlanKind::Start);
}

#[test]
fn noop_project_is_removed() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a", "b"]);
    let p = project(
        &mut q,
        scan,
        vec![
            YieldColumn::new(Expr::input_prop("a"), "a"),
            YieldColumn::new(Expr::input_prop("b"), "b"),
        ],
    );
    let project_var = q.plan_node(p).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, p).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::ScanVertices);
    assert_eq!(root.output_var(), project_var);
}

#[test]
fn renaming_project_survives() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a", "b"]);
    let p = project(
        &mut q,
        scan,
        vec![
            YieldColumn::new(Expr::input_prop("a"), "renamed"),
            YieldColumn::new(Expr::input_prop("b"), "b"),
        ],
    );

    let best = query_only_optimizer().find_best_plan(&mut q, p).unwrap();
    assert_eq!(q.plan_node(best).kind(), PlanKind::Project);
}

#[test]
fn limit_pushes_into_scan_edges_cap() {
    let mut q = qctx();
    let scan = scan_edges(&mut q, -1);
    let l = limit(&mut q, scan, 1, 3);

    let best = query_only_optimizer().find_best_plan(&mut q, l).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Limit);
    let below = q.plan_node(root.dep(0).unwrap());
    assert_eq!(below.kind(), PlanKind::ScanEdges);
    // The cap bounds the descendant at offset + count.
    assert_eq!(below.scan_limit(), Some(4));
}

#[test]
fn tight_existing_cap_stops_limit_pushdown() {
    let mut q = qctx();
    let scan = scan_edges(&mut q, 2);
    let l = limit(&mut q, scan, 1, 3);

    let best = query_only_optimizer().find_best_plan(&mut q, l).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Limit);
    let below = q.plan_node(root.dep(0).unwrap());
    assert_eq!(below.scan_limit(), Some(2));
}

#[test]
fn get_edges_transform_with_append_vertices_and_limit() {
    let mut q = qctx();
    let start = q.make_start();
    let sv = scan_vertices_from(&mut q, start, &["_vid"]);
    let tv = traverse(&mut q, sv, &["_v", "e"]);
    let av = append_vertices(&mut q, tv, &["_v", "e", "v2"]);
    let l = limit(&mut q, av, 1, 3);
    let p = project(&mut q, l, vec![YieldColumn::new(Expr::input_prop("e"), "e")]);
    let project_var = q.plan_node(p).output_var().to_owned();

    let best = query_only_optimizer().find_best_plan(&mut q, p).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Project);
    assert_eq!(root.output_var(), project_var);

    let l2 = q.plan_node(root.dep(0).unwrap());
    assert_eq!(l2.kind(), PlanKind::Limit);
    assert_eq!(l2.as_limit(), Some((1, 3)));

    let av2 = q.plan_node(l2.dep(0).unwrap());
    assert_eq!(av2.kind(), PlanKind::AppendVertices);

    let edge_proj = q.plan_node(av2.dep(0).unwrap());
    assert_eq!(edge_proj.kind(), PlanKind::Project);

    let scan_edges = q.plan_node(edge_proj.dep(0).unwrap());
    assert_eq!(scan_edges.kind(), PlanKind::ScanEdges);
    assert_eq!(scan_edges.scan_limit(), Some(4));
}

#[test]
fn optimization_is_idempotent() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["c0", "c1"]);
    let sort = sort_by(&mut q, scan, vec![asc(1)]);
    let l = limit(&mut q, sort, 0, 7);

    let optimizer = query_only_optimizer();
    let first = optimizer.find_best_plan(&mut q, l).unwrap();
    let first_shape = plan_shape(&q, first);

    let second = optimizer.find_best_plan(&mut q, first).unwrap();
    assert_eq!(plan_shape(&q, second), first_shape);
}

#[test]
fn geo_predicate_selects_cell_ranges() {
    let mut q = qctx_with_geo_index();
    let start = q.make_start();
    let scan = geo_index_full_scan(&mut q, start);
    let region = Expr::constant(Value::Geography(quiver_plan::value::Geography::Point(
        quiver_plan::value::GeoPoint::new(10.0, 20.0),
    )));
    let cond = Expr::function("st_intersects", vec![Expr::tag_prop("place", "geo"), region]);
    let f = filter(&mut q, scan, cond.clone());

    let optimizer = Optimizer::new(vec![default_rules(), query_rules()]);
    let best = optimizer.find_best_plan(&mut q, f).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::IndexScan);
    let detail = root.as_index_scan().unwrap();
    assert!(!detail.query_contexts.is_empty());
    for ictx in &detail.query_contexts {
        assert_eq!(ictx.index_id, Some(IDX_GEO));
        // Each range keeps the original predicate as a re-check filter.
        assert_eq!(ictx.filter, Some(cond.clone()));
        assert_eq!(ictx.column_hints.len(), 1);
        assert_eq!(ictx.column_hints[0].column_name, "geo");
    }
}

#[test]
fn sample_pushes_randomized_cap_into_get_neighbors() {
    let mut q = qctx();
    let start = q.make_start();
    let gn = get_neighbors(&mut q, start, &["_vid", "_edges"]);
    let p = project(
        &mut q,
        gn,
        vec![YieldColumn::new(Expr::input_prop("_edges"), "edges")],
    );
    let s = sample(&mut q, p, 10);

    let best = query_only_optimizer().find_best_plan(&mut q, s).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Sample);
    let mid = q.plan_node(root.dep(0).unwrap());
    assert_eq!(mid.kind(), PlanKind::Project);
    let below = q.plan_node(mid.dep(0).unwrap());
    assert_eq!(below.kind(), PlanKind::GetNeighbors);
    let detail = below.as_get_neighbors().unwrap();
    assert_eq!(detail.limit, 10);
    assert!(detail.random);
}

#[test]
fn fulltext_scan_absorbs_limit() {
    let mut q = qctx();
    let start = q.make_start();
    let ft = fulltext_index_scan(&mut q, start);
    let l = limit(&mut q, ft, 2, 10);

    let best = query_only_optimizer().find_best_plan(&mut q, l).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Limit);
    let below = q.plan_node(root.dep(0).unwrap());
    assert_eq!(below.kind(), PlanKind::FulltextIndexScan);
    match below.detail() {
        NodeDetail::FulltextIndexScan { limit, offset, .. } => {
            assert_eq!(*limit, 12);
            assert_eq!(*offset, 2);
        }
        other => panic!("expected a fulltext scan, got {other:?}"),
    }
}

#[test]
fn topn_pushes_order_into_index_scan() {
    let mut q = qctx();
    let start = q.make_start();
    let scan = tag_index_full_scan(&mut q, start);
    let p = project(
        &mut q,
        scan,
        vec![YieldColumn::new(Expr::input_prop("p1"), "p1")],
    );
    let topn = q.make_topn(Some(p), vec![asc(0)], 1, 5);

    let best = query_only_optimizer().find_best_plan(&mut q, topn).unwrap();

    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::TopN);
    let mid = q.plan_node(root.dep(0).unwrap());
    assert_eq!(mid.kind(), PlanKind::Project);
    let below = q.plan_node(mid.dep(0).unwrap());
    assert_eq!(below.kind(), PlanKind::TagIndexFullScan);
    let detail = below.as_index_scan().unwrap();
    assert_eq!(detail.limit, 6);
    assert_eq!(detail.order_by.len(), 1);
    assert_eq!(detail.order_by[0].pos, 0);
}
