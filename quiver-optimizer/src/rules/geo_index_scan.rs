//! Geo-predicate index selection: `st_intersects`/`st_covers`/
//! `st_coveredby`/`st_dwithin` against an indexed geography column become
//! a set of cell-range scans, each re-checked with the original predicate.

use std::sync::Arc;

use quiver_plan::expr::Expr;
use quiver_plan::meta::{GeoShape, PropertyType};
use quiver_plan::{PlanKind, Value};

use crate::context::OptContext;
use crate::error::Result;
use crate::expr_rewrite::is_geo_index_predicate;
use crate::geo::{GeoIndex, RegionCoverParams};
use crate::rule::{default_match, MatchedResult, OptRule, Pattern, TransformResult};
use crate::rules::index_scan::{candidate_indexes, install_scan_over_filter};

fn geo_scan_matches(ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
    if !default_match(ctx, matched) {
        return false;
    }
    let scan_id = matched.plan_node(ctx, &[0, 0]);
    let hints_unset = ctx
        .qctx()
        .plan_node(scan_id)
        .as_index_scan()
        .map(|d| d.query_contexts.iter().all(|c| c.column_hints.is_empty()))
        .unwrap_or(false);
    if !hints_unset {
        return false;
    }
    let filter_id = matched.plan_node(ctx, &[0]);
    let condition = &ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition;
    is_geo_index_predicate(condition)
}

fn geo_scan_transform(
    ctx: &mut OptContext<'_>,
    matched: &MatchedResult,
) -> Result<TransformResult> {
    let filter_gn = matched.node;
    let scan_gn = matched.dependencies[0].node;
    let filter_id = ctx.plan_id_of(filter_gn);
    let scan_id = ctx.plan_id_of(scan_gn);

    let indexes = candidate_indexes(ctx, scan_id);
    let Some(index) = indexes.last().cloned() else {
        return Ok(TransformResult::no_transform());
    };

    let condition = ctx
        .qctx()
        .plan_node(filter_id)
        .as_filter()
        .expect("pattern binds a filter")
        .condition
        .clone();
    let Expr::FunctionCall { name, args } = condition.as_ref() else {
        return Ok(TransformResult::no_transform());
    };
    if args.len() < 2 {
        return Ok(TransformResult::no_transform());
    }
    let predicate = name.to_ascii_lowercase();

    if !matches!(
        args[0].as_ref(),
        Expr::TagProp { .. } | Expr::EdgeProp { .. }
    ) {
        return Ok(TransformResult::no_transform());
    }
    let Some(Value::Geography(region)) = args[1].fold_constant() else {
        return Ok(TransformResult::no_transform());
    };

    // One geography field per geo index.
    if index.fields.len() != 1 {
        return Ok(TransformResult::no_transform());
    }
    let geo_field = &index.fields[0];
    let is_point_column = matches!(
        geo_field.prop_type,
        PropertyType::Geography(GeoShape::Point)
    );

    let mut params = RegionCoverParams::default();
    if let Some(index_params) = &index.index_params {
        if let Some(level) = index_params.s2_max_level {
            params.max_cell_level = level;
        }
        if let Some(cells) = index_params.s2_max_cells {
            params.max_cell_num = cells;
        }
    }
    let geo_index = GeoIndex::new(params, is_point_column);

    let scan_ranges = match predicate.as_str() {
        "st_intersects" => geo_index.intersects(&region),
        "st_covers" => geo_index.covered_by(&region),
        "st_coveredby" => geo_index.covers(&region),
        "st_dwithin" => {
            let Some(third) = args.get(2) else {
                return Ok(TransformResult::no_transform());
            };
            let Some(distance) = third.fold_constant() else {
                return Ok(TransformResult::no_transform());
            };
            if !distance.is_numeric() {
                return Ok(TransformResult::no_transform());
            }
            geo_index.d_within(&region, distance.as_float().unwrap_or(0.0))
        }
        _ => return Ok(TransformResult::no_transform()),
    };

    let contexts: Vec<_> = scan_ranges
        .iter()
        .map(|range| quiver_plan::hints::IndexQueryContext {
            index_id: Some(index.index_id),
            filter: Some(condition.clone()),
            column_hints: vec![range.to_column_hint(&geo_field.name)],
        })
        .collect();
    if contexts.is_empty() {
        return Ok(TransformResult::no_transform());
    }

    let new_scan = ctx
        .qctx_mut()
        .clone_plan_node_with_kind(scan_id, PlanKind::IndexScan);
    ctx.qctx_mut()
        .plan_node_mut(new_scan)
        .as_index_scan_mut()
        .expect("index kinds share the payload")
        .query_contexts = contexts;

    let new_gn = install_scan_over_filter(ctx, filter_gn, scan_gn, new_scan);
    Ok(TransformResult::erase_all_with(vec![new_gn]))
}

macro_rules! geo_predicate_index_scan_rule {
    ($rule:ident, $name:literal, $full:ident) => {
        pub struct $rule {
            pattern: Pattern,
        }

        impl $rule {
            pub fn new() -> Arc<Self> {
                Arc::new($rule {
                    pattern: Pattern::create(
                        PlanKind::Filter,
                        vec![Pattern::node(PlanKind::$full)],
                    ),
                })
            }
        }

        impl OptRule for $rule {
            fn pattern(&self) -> &Pattern {
                &self.pattern
            }

            fn matches(&self, ctx: &OptContext<'_>, matched: &MatchedResult) -> bool {
                geo_scan_matches(ctx, matched)
            }

            fn transform(
                &self,
                ctx: &mut OptContext<'_>,
                matched: &MatchedResult,
            ) -> Result<TransformResult> {
                geo_scan_transform(ctx, matched)
            }

            fn name(&self) -> &'static str {
                $name
            }
        }
    };
}

geo_predicate_index_scan_rule!(
    GeoPredicateTagIndexScanRule,
    "GeoPredicateTagIndexScanRule",
    TagIndexFullScan
);
geo_predicate_index_scan_rule!(
    GeoPredicateEdgeIndexScanRule,
    "GeoPredicateEdgeIndexScanRule",
    EdgeIndexFullScan
);
