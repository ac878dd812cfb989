//! Memo construction, pattern matching, and control-flow realization.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use quiver_plan::expr::Expr;
use quiver_plan::{NodeDetail, PlanKind};
use quiver_optimizer::rule::Pattern;
use quiver_optimizer::{OptContext, Optimizer};

#[test]
fn empty_rule_run_returns_the_input_plan() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a"]);
    let f = filter(
        &mut q,
        scan,
        Expr::gt(Expr::input_prop("a"), Expr::constant(0i64)),
    );
    let shape = plan_shape(&q, f);

    let best = Optimizer::new(vec![]).find_best_plan(&mut q, f).unwrap();
    assert_eq!(best, f);
    assert_eq!(plan_shape(&q, best), shape);
}

#[test]
fn unwired_input_is_a_plan_error() {
    let mut q = qctx();
    let f = q.make_filter(None, Expr::constant(true));
    let result = Optimizer::new(vec![]).find_best_plan(&mut q, f);
    assert!(matches!(
        result,
        Err(quiver_optimizer::OptError::PlanError(_))
    ));
}

#[test]
fn select_branches_are_realized_through_bodies() {
    let mut q = qctx();
    let start = q.make_start();
    let then_branch = scan_vertices(&mut q, &["a"]);
    let else_branch = scan_vertices(&mut q, &["a"]);
    let select = q.make_node(
        PlanKind::Select,
        NodeDetail::Select {
            condition: Expr::constant(true),
            then_body: Some(then_branch),
            else_body: Some(else_branch),
        },
        &[Some(start)],
    );

    let best = Optimizer::new(vec![]).find_best_plan(&mut q, select).unwrap();
    let root = q.plan_node(best);
    assert_eq!(root.kind(), PlanKind::Select);
    match root.detail() {
        NodeDetail::Select {
            then_body,
            else_body,
            ..
        } => {
            assert_eq!(*then_body, Some(then_branch));
            assert_eq!(*else_body, Some(else_branch));
        }
        other => panic!("expected a select, got {other:?}"),
    }
}

#[test]
fn loop_body_is_realized_through_bodies() {
    let mut q = qctx();
    let start = q.make_start();
    let body = scan_vertices(&mut q, &["a"]);
    let looped = q.make_node(
        PlanKind::Loop,
        NodeDetail::Loop {
            condition: Expr::constant(true),
            body: Some(body),
        },
        &[Some(start)],
    );

    let best = Optimizer::new(vec![]).find_best_plan(&mut q, looped).unwrap();
    match q.plan_node(best).detail() {
        NodeDetail::Loop { body: b, .. } => assert_eq!(*b, Some(body)),
        other => panic!("expected a loop, got {other:?}"),
    }
}

#[test]
fn shared_input_becomes_one_group() {
    // Both join inputs read the same scan; memoization must produce a
    // single group for it, referenced twice.
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a"]);
    let join = q.make_node(
        PlanKind::CrossJoin,
        NodeDetail::CrossJoin,
        &[Some(scan), Some(scan)],
    );

    let best = Optimizer::new(vec![]).find_best_plan(&mut q, join).unwrap();
    let root = q.plan_node(best);
    assert_eq!(root.dep(0), Some(scan));
    assert_eq!(root.dep(1), Some(scan));
}

#[test]
fn pattern_matches_kind_tree() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a"]);
    let f = filter(&mut q, scan, Expr::constant(true));

    let mut ctx = OptContext::new(&mut q);
    let scan_group = ctx.create_group();
    let scan_gn = ctx.make_group_node(scan_group, scan);
    let filter_group = ctx.create_group();
    let filter_gn = ctx.make_group_node(filter_group, f);
    ctx.depends_on(filter_gn, scan_group);

    let exact = Pattern::create(
        PlanKind::Filter,
        vec![Pattern::node(PlanKind::ScanVertices)],
    );
    let matched = exact.match_group_node(&ctx, filter_gn).unwrap();
    assert_eq!(matched.node, filter_gn);
    assert_eq!(matched.dependencies.len(), 1);
    assert_eq!(matched.dependencies[0].node, scan_gn);

    // A childless pattern ignores the dependencies entirely.
    let loose = Pattern::node(PlanKind::Filter);
    assert!(loose.match_group_node(&ctx, filter_gn).is_some());

    // The wildcard kind matches anything in child position.
    let wild = Pattern::create(PlanKind::Filter, vec![Pattern::node(PlanKind::Unknown)]);
    assert!(wild.match_group_node(&ctx, filter_gn).is_some());

    // Kind mismatches and arity mismatches fail.
    let wrong_kind = Pattern::create(PlanKind::Project, vec![]);
    assert!(wrong_kind.match_group_node(&ctx, filter_gn).is_none());
    let wrong_arity = Pattern::create(
        PlanKind::Filter,
        vec![
            Pattern::node(PlanKind::Unknown),
            Pattern::node(PlanKind::Unknown),
        ],
    );
    assert!(wrong_arity.match_group_node(&ctx, filter_gn).is_none());

    // Multi-kind disjunction.
    let multi = Pattern::create_multi(
        vec![PlanKind::Project, PlanKind::Filter],
        vec![Pattern::node(PlanKind::ScanVertices)],
    );
    assert!(multi.match_group_node(&ctx, filter_gn).is_some());
}

#[test]
fn group_match_tries_every_candidate() {
    let mut q = qctx();
    let scan = scan_vertices(&mut q, &["a"]);
    let dedup = q.make_node(PlanKind::Dedup, NodeDetail::Dedup, &[Some(scan)]);
    let alt = q.clone_plan_node(dedup);
    let dedup_out = q.plan_node(dedup).output_var().to_owned();
    q.set_output_var(alt, &dedup_out);

    let mut ctx = OptContext::new(&mut q);
    let scan_group = ctx.create_group();
    let scan_gn = ctx.make_group_node(scan_group, scan);
    let group = ctx.create_group();
    let first = ctx.make_group_node(group, dedup);
    ctx.depends_on(first, scan_group);
    let second = ctx.make_group_node(group, alt);
    ctx.depends_on(second, scan_group);
    let _ = scan_gn;

    let pattern = Pattern::node(PlanKind::Dedup);
    let matched = pattern.match_group(&ctx, group).unwrap();
    // Insertion order decides which candidate binds first.
    assert_eq!(matched.node, first);
}
