//! Expression-level helpers shared by the rule library: the top-level
//! conjunct splitter, property-reference rewrites, IN/OR normalization,
//! and the storage-pushability split.

use quiver_plan::expr::{collect_all, find_any, rewrite, Expr, ExprKind, ExprRef, LogicalOp, RelOp};
use quiver_plan::Value;

/// Every expression kind that names a column or property.
pub const PROPERTY_KINDS: &[ExprKind] = &[
    ExprKind::TagProp,
    ExprKind::AliasTagProp,
    ExprKind::EdgeProp,
    ExprKind::InputProp,
    ExprKind::VarProp,
    ExprKind::DstProp,
    ExprKind::SrcProp,
];

/// Split a condition at its top-level conjunction: operands accepted by
/// `picker` are AND-ed into the first result, the rest into the second.
/// A non-AND condition goes entirely to one side.
pub fn split_filter(
    cond: &ExprRef,
    picker: impl Fn(&ExprRef) -> bool,
) -> (Option<ExprRef>, Option<ExprRef>) {
    let operands: Vec<ExprRef> = match cond.as_ref() {
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        } => operands.clone(),
        _ => vec![cond.clone()],
    };

    let (picked, unpicked): (Vec<ExprRef>, Vec<ExprRef>) =
        operands.into_iter().partition(|e| picker(e));

    let build = |mut exprs: Vec<ExprRef>| -> Option<ExprRef> {
        match exprs.len() {
            0 => None,
            1 => Some(exprs.pop().unwrap()),
            _ => Some(Expr::logical(LogicalOp::And, exprs)),
        }
    };
    (build(picked), build(unpicked))
}

/// Whether every property reference in `expr` names a column in `cols`.
/// Expressions without property references are not considered covered.
pub fn check_col_names(cols: &[String], expr: &ExprRef) -> bool {
    let props = collect_all(expr, PROPERTY_KINDS);
    if props.is_empty() {
        return false;
    }
    props.iter().all(|p| {
        p.prop_name()
            .map(|name| cols.iter().any(|c| c == name))
            .unwrap_or(false)
    })
}

/// Clone `expr` with every `$var.prop` reference re-pointed at `new_var`.
pub fn rewrite_inner_var(expr: &ExprRef, new_var: &str) -> ExprRef {
    let new_var = new_var.to_owned();
    rewrite(
        expr,
        &|e| matches!(e.as_ref(), Expr::VarProp { .. }),
        &move |e| match e.as_ref() {
            Expr::VarProp { prop, .. } => Expr::var_prop(new_var.clone(), prop.clone()),
            _ => unreachable!(),
        },
    )
}

/// Lower `alias.tag.prop` references against the resolved node alias into
/// the `tag.prop` form the storage layer evaluates.
pub fn rewrite_alias_tag_props(expr: &ExprRef, alias: &str) -> ExprRef {
    let alias = alias.to_owned();
    rewrite(
        expr,
        &move |e| matches!(e.as_ref(), Expr::AliasTagProp { alias: a, .. } if *a == alias),
        &|e| match e.as_ref() {
            Expr::AliasTagProp { tag, prop, .. } => Expr::tag_prop(tag.clone(), prop.clone()),
            _ => unreachable!(),
        },
    )
}

/// Items of a container expression or a constant list.
pub fn container_operands(expr: &ExprRef) -> Option<Vec<ExprRef>> {
    match expr.as_ref() {
        Expr::List(items) => Some(items.clone()),
        Expr::Constant(Value::List(items)) => {
            Some(items.iter().map(|v| Expr::constant(v.clone())).collect())
        }
        _ => None,
    }
}

/// `A IN [b]` becomes `A == b`; `A IN [b, c, ...]` becomes the OR of the
/// per-element equalities. Non-IN expressions pass through untouched.
pub fn rewrite_in_expr(expr: &ExprRef) -> ExprRef {
    let Expr::Relational {
        op: RelOp::In,
        left,
        right,
    } = expr.as_ref()
    else {
        return expr.clone();
    };
    let Some(items) = container_operands(right) else {
        return expr.clone();
    };
    let eqs: Vec<ExprRef> = items
        .into_iter()
        .map(|item| Expr::eq(left.clone(), item))
        .collect();
    match eqs.len() {
        0 => expr.clone(),
        _ => Expr::or_all(eqs),
    }
}

/// Flatten nested ORs into one n-ary OR.
pub fn pull_ors(expr: &ExprRef) -> ExprRef {
    let Expr::Logical {
        op: LogicalOp::Or,
        operands,
    } = expr.as_ref()
    else {
        return expr.clone();
    };
    let mut flat = Vec::new();
    for operand in operands {
        match pull_ors(operand).as_ref() {
            Expr::Logical {
                op: LogicalOp::Or,
                operands: inner,
            } => flat.extend(inner.iter().cloned()),
            _ => flat.push(operand.clone()),
        }
    }
    Expr::logical(LogicalOp::Or, flat)
}

/// Flatten nested ANDs into one n-ary AND.
pub fn pull_ands(expr: &ExprRef) -> ExprRef {
    let Expr::Logical {
        op: LogicalOp::And,
        operands,
    } = expr.as_ref()
    else {
        return expr.clone();
    };
    let mut flat = Vec::new();
    for operand in operands {
        match pull_ands(operand).as_ref() {
            Expr::Logical {
                op: LogicalOp::And,
                operands: inner,
            } => flat.extend(inner.iter().cloned()),
            _ => flat.push(operand.clone()),
        }
    }
    Expr::logical(LogicalOp::And, flat)
}

/// Distribute a top-level AND over its OR operands:
/// `(a OR b) AND c` becomes `(a AND c) OR (b AND c)`. The result of the
/// full cartesian expansion is a flat OR of ANDs, which the union-scan
/// rule turns into one index context per operand.
pub fn rewrite_and_over_or(expr: &ExprRef) -> ExprRef {
    let Expr::Logical {
        op: LogicalOp::And,
        operands,
    } = expr.as_ref()
    else {
        return expr.clone();
    };

    // Cartesian product over the operands, treating non-OR operands as
    // singleton alternatives.
    let mut alternatives: Vec<Vec<ExprRef>> = vec![vec![]];
    for operand in operands {
        let choices: Vec<ExprRef> = match pull_ors(operand).as_ref() {
            Expr::Logical {
                op: LogicalOp::Or,
                operands: inner,
            } => inner.clone(),
            _ => vec![operand.clone()],
        };
        let mut next = Vec::with_capacity(alternatives.len() * choices.len());
        for alt in &alternatives {
            for choice in &choices {
                let mut extended = alt.clone();
                extended.push(choice.clone());
                next.push(extended);
            }
        }
        alternatives = next;
    }

    if alternatives.len() == 1 {
        return expr.clone();
    }
    let disjuncts: Vec<ExprRef> = alternatives.into_iter().map(Expr::and_all).collect();
    Expr::or_all(disjuncts)
}

fn storage_vertex_leaf(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Constant(_) | Expr::TagProp { .. } | Expr::SrcProp { .. }
    )
}

fn is_storage_vertex_expr(e: &ExprRef) -> bool {
    if storage_vertex_leaf(e) {
        return true;
    }
    match e.as_ref() {
        Expr::Unary { operand, .. } => is_storage_vertex_expr(operand),
        Expr::Relational { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
            is_storage_vertex_expr(left) && is_storage_vertex_expr(right)
        }
        Expr::Logical { operands, .. } => operands.iter().all(is_storage_vertex_expr),
        Expr::List(items) => items.iter().all(is_storage_vertex_expr),
        _ => false,
    }
}

/// Split off the conjuncts a vertex-side storage scan can evaluate itself:
/// tag/source properties and constants only. Returns
/// `(pushable, remainder)`.
pub fn extract_vertex_filter(cond: &ExprRef) -> (Option<ExprRef>, Option<ExprRef>) {
    split_filter(cond, is_storage_vertex_expr)
}

fn is_storage_edge_expr(e: &ExprRef) -> bool {
    match e.as_ref() {
        Expr::Constant(_)
        | Expr::EdgeProp { .. }
        | Expr::SrcProp { .. }
        | Expr::DstProp { .. } => true,
        Expr::Unary { operand, .. } => is_storage_edge_expr(operand),
        Expr::Relational { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
            is_storage_edge_expr(left) && is_storage_edge_expr(right)
        }
        Expr::Logical { operands, .. } => operands.iter().all(is_storage_edge_expr),
        Expr::List(items) => items.iter().all(is_storage_edge_expr),
        _ => false,
    }
}

/// Split off the conjuncts an edge-side storage scan can evaluate itself.
pub fn extract_edge_filter(cond: &ExprRef) -> (Option<ExprRef>, Option<ExprRef>) {
    split_filter(cond, is_storage_edge_expr)
}

/// The geo predicates the index layer can accelerate.
pub fn is_geo_index_predicate(cond: &ExprRef) -> bool {
    match cond.as_ref() {
        Expr::FunctionCall { name, .. } => matches!(
            name.to_ascii_lowercase().as_str(),
            "st_intersects" | "st_covers" | "st_coveredby" | "st_dwithin"
        ),
        _ => false,
    }
}

/// Re-exported convenience wrappers so rules import one module.
pub use quiver_plan::expr::{collect_all as collect_exprs, find_any as find_expr, rewrite as rewrite_expr};

/// Whether the condition contains any expression of the given kinds.
pub fn contains_kind(cond: &ExprRef, kinds: &[ExprKind]) -> bool {
    find_any(cond, kinds).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a() -> ExprRef {
        Expr::gt(Expr::input_prop("a"), Expr::constant(1i64))
    }

    fn b() -> ExprRef {
        Expr::lt(Expr::input_prop("b"), Expr::constant(2i64))
    }

    #[test]
    fn split_filter_partitions_conjuncts() {
        let cond = Expr::and(a(), b());
        let (picked, rest) = split_filter(&cond, |e| {
            check_col_names(&["a".to_owned()], e)
        });
        assert_eq!(picked, Some(a()));
        assert_eq!(rest, Some(b()));
    }

    #[test]
    fn split_then_combine_recovers_operands() {
        // Law L1: combining with AND then splitting with an accept-all
        // picker yields the original operand set.
        let cond = Expr::and(a(), b());
        let (picked, rest) = split_filter(&cond, |_| true);
        assert_eq!(rest, None);
        match picked.unwrap().as_ref() {
            Expr::Logical { operands, .. } => {
                assert_eq!(operands.as_slice(), &[a(), b()]);
            }
            other => panic!("expected AND, got {}", other),
        }
    }

    #[test]
    fn split_filter_non_conjunction_goes_whole() {
        let cond = Expr::or(a(), b());
        let (picked, rest) = split_filter(&cond, |_| false);
        assert_eq!(picked, None);
        assert_eq!(rest, Some(cond));
    }

    #[test]
    fn in_expr_single_element_becomes_eq() {
        let e = Expr::in_list(
            Expr::tag_prop("t", "p"),
            Expr::list(vec![Expr::constant(1i64)]),
        );
        let rewritten = rewrite_in_expr(&e);
        assert_eq!(
            rewritten,
            Expr::eq(Expr::tag_prop("t", "p"), Expr::constant(1i64))
        );
    }

    #[test]
    fn in_expr_multi_element_becomes_or() {
        let e = Expr::in_list(
            Expr::tag_prop("t", "p"),
            Expr::list(vec![Expr::constant(1i64), Expr::constant(2i64)]),
        );
        let rewritten = rewrite_in_expr(&e);
        match rewritten.as_ref() {
            Expr::Logical { op, operands } => {
                assert_eq!(*op, LogicalOp::Or);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("expected OR, got {}", other),
        }
    }

    #[test]
    fn and_over_or_distributes() {
        let or = Expr::or(
            Expr::eq(Expr::tag_prop("t", "p"), Expr::constant(1i64)),
            Expr::eq(Expr::tag_prop("t", "p"), Expr::constant(2i64)),
        );
        let cond = Expr::and(or, a());
        let rewritten = rewrite_and_over_or(&cond);
        match rewritten.as_ref() {
            Expr::Logical { op, operands } => {
                assert_eq!(*op, LogicalOp::Or);
                assert_eq!(operands.len(), 2);
                for operand in operands {
                    assert!(matches!(
                        operand.as_ref(),
                        Expr::Logical {
                            op: LogicalOp::And,
                            ..
                        }
                    ));
                }
            }
            other => panic!("expected OR of ANDs, got {}", other),
        }
    }

    #[test]
    fn vertex_filter_extraction() {
        let pushable = Expr::gt(Expr::tag_prop("person", "age"), Expr::constant(30i64));
        let stuck = Expr::eq(Expr::input_prop("name"), Expr::constant("x"));
        let (pushed, remained) = extract_vertex_filter(&Expr::and(pushable.clone(), stuck.clone()));
        assert_eq!(pushed, Some(pushable));
        assert_eq!(remained, Some(stuck));
    }

    #[test]
    fn rewrite_inner_var_replaces_owner() {
        let e = Expr::eq(Expr::var_prop("old", "c"), Expr::constant(1i64));
        let rewritten = rewrite_inner_var(&e, "new");
        assert_eq!(
            rewritten,
            Expr::eq(Expr::var_prop("new", "c"), Expr::constant(1i64))
        );
    }
}
