//! Immutable expression trees.
//!
//! Expressions are shared, never mutated in place: every rewrite builds a
//! new tree and subtrees that survive a rewrite are shared through [`Arc`].
//! This is what keeps rule transforms safe to interleave: a condition that
//! one rule has already captured can never be edited out from under it.

use std::fmt;
use std::sync::Arc;

use strum::Display;

use crate::value::Value;

pub type ExprRef = Arc<Expr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl RelOp {
    /// Operators usable as index column bounds.
    pub fn is_bounding(&self) -> bool {
        matches!(
            self,
            RelOp::Eq | RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

/// Field-less discriminant of [`Expr`], used by pattern-ish expression
/// matching in the rewrite helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ExprKind {
    Constant,
    Label,
    InputProp,
    VarProp,
    TagProp,
    AliasTagProp,
    EdgeProp,
    SrcProp,
    DstProp,
    Column,
    Variable,
    List,
    Unary,
    Relational,
    Arithmetic,
    Logical,
    FunctionCall,
    Subscript,
    PathBuild,
    EdgeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    /// A bare label reference, resolved later by the validator.
    Label(String),
    /// `$-.prop`, a column of the pipe input.
    InputProp(String),
    /// `$var.prop`, a column of a named variable.
    VarProp { var: String, prop: String },
    /// `tag.prop` against the scanned schema, as storage evaluates it.
    TagProp { tag: String, prop: String },
    /// `v.tag.prop` where `v` is a pattern alias not yet resolved to a
    /// storage-level property reference.
    AliasTagProp { alias: String, tag: String, prop: String },
    /// `edge.prop` as storage evaluates it.
    EdgeProp { edge: String, prop: String },
    /// `$^.tag.prop`, a property of the source vertex of an edge.
    SrcProp { tag: String, prop: String },
    /// `$$.tag.prop`, a property of the destination vertex of an edge.
    DstProp { tag: String, prop: String },
    /// `COLUMN[i]`, a positional column reference.
    Column(usize),
    /// `$var`, a whole dataset reference.
    Variable(String),
    List(Vec<ExprRef>),
    Unary { op: UnaryOp, operand: ExprRef },
    Relational { op: RelOp, left: ExprRef, right: ExprRef },
    Arithmetic { op: ArithOp, left: ExprRef, right: ExprRef },
    /// n-ary logical connective.
    Logical { op: LogicalOp, operands: Vec<ExprRef> },
    FunctionCall { name: String, args: Vec<ExprRef> },
    Subscript { collection: ExprRef, index: ExprRef },
    PathBuild(Vec<ExprRef>),
    /// The whole current edge, e.g. when projecting edges out of a scan.
    EdgeValue,
}

impl Expr {
    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Constant(_) => ExprKind::Constant,
            Expr::Label(_) => ExprKind::Label,
            Expr::InputProp(_) => ExprKind::InputProp,
            Expr::VarProp { .. } => ExprKind::VarProp,
            Expr::TagProp { .. } => ExprKind::TagProp,
            Expr::AliasTagProp { .. } => ExprKind::AliasTagProp,
            Expr::EdgeProp { .. } => ExprKind::EdgeProp,
            Expr::SrcProp { .. } => ExprKind::SrcProp,
            Expr::DstProp { .. } => ExprKind::DstProp,
            Expr::Column(_) => ExprKind::Column,
            Expr::Variable(_) => ExprKind::Variable,
            Expr::List(_) => ExprKind::List,
            Expr::Unary { .. } => ExprKind::Unary,
            Expr::Relational { .. } => ExprKind::Relational,
            Expr::Arithmetic { .. } => ExprKind::Arithmetic,
            Expr::Logical { .. } => ExprKind::Logical,
            Expr::FunctionCall { .. } => ExprKind::FunctionCall,
            Expr::Subscript { .. } => ExprKind::Subscript,
            Expr::PathBuild(_) => ExprKind::PathBuild,
            Expr::EdgeValue => ExprKind::EdgeValue,
        }
    }

    pub fn is_rel_expr(&self) -> bool {
        matches!(self, Expr::Relational { .. })
    }

    pub fn is_logical_expr(&self) -> bool {
        matches!(self, Expr::Logical { .. })
    }

    pub fn is_container_expr(&self) -> bool {
        matches!(self, Expr::List(_))
    }

    /// Any expression that names a column/property of some dataset.
    pub fn is_property_expr(&self) -> bool {
        matches!(
            self,
            Expr::InputProp(_)
                | Expr::VarProp { .. }
                | Expr::TagProp { .. }
                | Expr::AliasTagProp { .. }
                | Expr::EdgeProp { .. }
                | Expr::SrcProp { .. }
                | Expr::DstProp { .. }
        )
    }

    /// The referenced property (column) name of a property expression.
    pub fn prop_name(&self) -> Option<&str> {
        match self {
            Expr::InputProp(prop)
            | Expr::VarProp { prop, .. }
            | Expr::TagProp { prop, .. }
            | Expr::AliasTagProp { prop, .. }
            | Expr::EdgeProp { prop, .. }
            | Expr::SrcProp { prop, .. }
            | Expr::DstProp { prop, .. } => Some(prop),
            _ => None,
        }
    }

    /// Child subtrees in evaluation order.
    pub fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Constant(_)
            | Expr::Label(_)
            | Expr::InputProp(_)
            | Expr::VarProp { .. }
            | Expr::TagProp { .. }
            | Expr::AliasTagProp { .. }
            | Expr::EdgeProp { .. }
            | Expr::SrcProp { .. }
            | Expr::DstProp { .. }
            | Expr::Column(_)
            | Expr::Variable(_)
            | Expr::EdgeValue => vec![],
            Expr::List(items) | Expr::PathBuild(items) => items.iter().collect(),
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Relational { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                vec![left, right]
            }
            Expr::Logical { operands, .. } => operands.iter().collect(),
            Expr::FunctionCall { args, .. } => args.iter().collect(),
            Expr::Subscript { collection, index } => vec![collection, index],
        }
    }

    // Constructors. All of them hand back an `ExprRef` so call sites
    // compose without sprinkling `Arc::new`.

    pub fn constant(v: impl Into<Value>) -> ExprRef {
        Arc::new(Expr::Constant(v.into()))
    }

    pub fn input_prop(prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::InputProp(prop.into()))
    }

    pub fn var_prop(var: impl Into<String>, prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::VarProp {
            var: var.into(),
            prop: prop.into(),
        })
    }

    pub fn tag_prop(tag: impl Into<String>, prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::TagProp {
            tag: tag.into(),
            prop: prop.into(),
        })
    }

    pub fn alias_tag_prop(
        alias: impl Into<String>,
        tag: impl Into<String>,
        prop: impl Into<String>,
    ) -> ExprRef {
        Arc::new(Expr::AliasTagProp {
            alias: alias.into(),
            tag: tag.into(),
            prop: prop.into(),
        })
    }

    pub fn edge_prop(edge: impl Into<String>, prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::EdgeProp {
            edge: edge.into(),
            prop: prop.into(),
        })
    }

    pub fn src_prop(tag: impl Into<String>, prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::SrcProp {
            tag: tag.into(),
            prop: prop.into(),
        })
    }

    pub fn dst_prop(tag: impl Into<String>, prop: impl Into<String>) -> ExprRef {
        Arc::new(Expr::DstProp {
            tag: tag.into(),
            prop: prop.into(),
        })
    }

    pub fn column(index: usize) -> ExprRef {
        Arc::new(Expr::Column(index))
    }

    pub fn variable(var: impl Into<String>) -> ExprRef {
        Arc::new(Expr::Variable(var.into()))
    }

    pub fn list(items: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::List(items))
    }

    pub fn not(operand: ExprRef) -> ExprRef {
        Arc::new(Expr::Unary {
            op: UnaryOp::Not,
            operand,
        })
    }

    pub fn rel(op: RelOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Expr::Relational { op, left, right })
    }

    pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::rel(RelOp::Eq, left, right)
    }

    pub fn lt(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::rel(RelOp::Lt, left, right)
    }

    pub fn gt(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::rel(RelOp::Gt, left, right)
    }

    pub fn in_list(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::rel(RelOp::In, left, right)
    }

    pub fn arith(op: ArithOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Expr::Arithmetic { op, left, right })
    }

    pub fn logical(op: LogicalOp, operands: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::Logical { op, operands })
    }

    /// `a AND b`, flattening nested ANDs on either side.
    pub fn and(left: ExprRef, right: ExprRef) -> ExprRef {
        let mut operands = Vec::new();
        for e in [left, right] {
            match e.as_ref() {
                Expr::Logical {
                    op: LogicalOp::And,
                    operands: inner,
                } => operands.extend(inner.iter().cloned()),
                _ => operands.push(e),
            }
        }
        Self::logical(LogicalOp::And, operands)
    }

    /// `a OR b`, flattening nested ORs on either side.
    pub fn or(left: ExprRef, right: ExprRef) -> ExprRef {
        let mut operands = Vec::new();
        for e in [left, right] {
            match e.as_ref() {
                Expr::Logical {
                    op: LogicalOp::Or,
                    operands: inner,
                } => operands.extend(inner.iter().cloned()),
                _ => operands.push(e),
            }
        }
        Self::logical(LogicalOp::Or, operands)
    }

    /// Conjunction of an operand list; a single operand stays bare.
    pub fn and_all(mut operands: Vec<ExprRef>) -> ExprRef {
        if operands.len() == 1 {
            operands.pop().unwrap()
        } else {
            Self::logical(LogicalOp::And, operands)
        }
    }

    pub fn or_all(mut operands: Vec<ExprRef>) -> ExprRef {
        if operands.len() == 1 {
            operands.pop().unwrap()
        } else {
            Self::logical(LogicalOp::Or, operands)
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::FunctionCall {
            name: name.into(),
            args,
        })
    }

    pub fn subscript(collection: ExprRef, index: ExprRef) -> ExprRef {
        Arc::new(Expr::Subscript { collection, index })
    }

    pub fn path_build(steps: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::PathBuild(steps))
    }

    pub fn edge_value() -> ExprRef {
        Arc::new(Expr::EdgeValue)
    }

    /// Fold the expression to a constant if it is built purely from
    /// constants. This is the only evaluation the optimizer performs.
    pub fn fold_constant(&self) -> Option<Value> {
        match self {
            Expr::Constant(v) => Some(v.clone()),
            Expr::List(items) => items
                .iter()
                .map(|i| i.fold_constant())
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => match operand.fold_constant()? {
                Value::Bool(b) => Some(Value::Bool(!b)),
                _ => None,
            },
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => match operand.fold_constant()? {
                Value::Int(i) => Some(Value::Int(-i)),
                Value::Float(f) => Some(Value::Float(-f)),
                _ => None,
            },
            Expr::Arithmetic { op, left, right } => {
                let (l, r) = (left.fold_constant()?, right.fold_constant()?);
                match (l, r) {
                    (Value::Int(a), Value::Int(b)) => Some(Value::Int(match op {
                        ArithOp::Add => a.checked_add(b)?,
                        ArithOp::Sub => a.checked_sub(b)?,
                        ArithOp::Mul => a.checked_mul(b)?,
                        ArithOp::Div => a.checked_div(b)?,
                        ArithOp::Mod => a.checked_rem(b)?,
                    })),
                    (a, b) if a.is_numeric() && b.is_numeric() => {
                        let (a, b) = (a.as_float()?, b.as_float()?);
                        Some(Value::Float(match op {
                            ArithOp::Add => a + b,
                            ArithOp::Sub => a - b,
                            ArithOp::Mul => a * b,
                            ArithOp::Div => a / b,
                            ArithOp::Mod => a % b,
                        }))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn is_evaluable(&self) -> bool {
        self.fold_constant().is_some()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(v) => write!(f, "{:?}", v),
            Expr::Label(name) => write!(f, "{}", name),
            Expr::InputProp(prop) => write!(f, "$-.{}", prop),
            Expr::VarProp { var, prop } => write!(f, "${}.{}", var, prop),
            Expr::TagProp { tag, prop } => write!(f, "{}.{}", tag, prop),
            Expr::AliasTagProp { alias, tag, prop } => write!(f, "{}.{}.{}", alias, tag, prop),
            Expr::EdgeProp { edge, prop } => write!(f, "{}.{}", edge, prop),
            Expr::SrcProp { tag, prop } => write!(f, "$^.{}.{}", tag, prop),
            Expr::DstProp { tag, prop } => write!(f, "$$.{}.{}", tag, prop),
            Expr::Column(i) => write!(f, "COLUMN[{}]", i),
            Expr::Variable(var) => write!(f, "${}", var),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Unary { op, operand } => write!(f, "{}({})", op, operand),
            Expr::Relational { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Arithmetic { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Logical { op, operands } => {
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op)?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
            Expr::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Subscript { collection, index } => write!(f, "{}[{}]", collection, index),
            Expr::PathBuild(steps) => {
                write!(f, "PATH(")?;
                for (i, step) in steps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", step)?;
                }
                write!(f, ")")
            }
            Expr::EdgeValue => write!(f, "EDGE"),
        }
    }
}

/// Collect every subtree whose kind is in `kinds`, in preorder.
pub fn collect_all(expr: &ExprRef, kinds: &[ExprKind]) -> Vec<ExprRef> {
    let mut out = Vec::new();
    collect_into(expr, kinds, &mut out);
    out
}

fn collect_into(expr: &ExprRef, kinds: &[ExprKind], out: &mut Vec<ExprRef>) {
    if kinds.contains(&expr.kind()) {
        out.push(expr.clone());
    }
    for child in expr.children() {
        collect_into(child, kinds, out);
    }
}

/// First subtree whose kind is in `kinds`, preorder.
pub fn find_any(expr: &ExprRef, kinds: &[ExprKind]) -> Option<ExprRef> {
    if kinds.contains(&expr.kind()) {
        return Some(expr.clone());
    }
    expr.children().into_iter().find_map(|c| find_any(c, kinds))
}

/// Rebuild `expr` bottom-up, replacing every subtree accepted by `matcher`
/// with `rewriter`'s output. Subtrees the rewrite does not touch are shared
/// with the input.
pub fn rewrite(
    expr: &ExprRef,
    matcher: &dyn Fn(&ExprRef) -> bool,
    rewriter: &dyn Fn(&ExprRef) -> ExprRef,
) -> ExprRef {
    if matcher(expr) {
        return rewriter(expr);
    }
    let rebuild_list =
        |items: &[ExprRef]| items.iter().map(|i| rewrite(i, matcher, rewriter)).collect();
    match expr.as_ref() {
        Expr::List(items) => Expr::list(rebuild_list(items)),
        Expr::PathBuild(items) => Expr::path_build(rebuild_list(items)),
        Expr::Unary { op, operand } => Arc::new(Expr::Unary {
            op: *op,
            operand: rewrite(operand, matcher, rewriter),
        }),
        Expr::Relational { op, left, right } => Expr::rel(
            *op,
            rewrite(left, matcher, rewriter),
            rewrite(right, matcher, rewriter),
        ),
        Expr::Arithmetic { op, left, right } => Expr::arith(
            *op,
            rewrite(left, matcher, rewriter),
            rewrite(right, matcher, rewriter),
        ),
        Expr::Logical { op, operands } => Expr::logical(*op, rebuild_list(operands)),
        Expr::FunctionCall { name, args } => Expr::function(name.clone(), rebuild_list(args)),
        Expr::Subscript { collection, index } => Expr::subscript(
            rewrite(collection, matcher, rewriter),
            rewrite(index, matcher, rewriter),
        ),
        _ => expr.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn and_flattens_nested_conjunctions() {
        let a = Expr::gt(Expr::input_prop("a"), Expr::constant(1i64));
        let b = Expr::lt(Expr::input_prop("b"), Expr::constant(2i64));
        let c = Expr::eq(Expr::input_prop("c"), Expr::constant(3i64));
        let nested = Expr::and(Expr::and(a.clone(), b.clone()), c.clone());
        match nested.as_ref() {
            Expr::Logical { op, operands } => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(operands.len(), 3);
            }
            other => panic!("expected logical AND, got {}", other),
        }
    }

    #[test]
    fn rewrite_shares_untouched_subtrees() {
        let cond = Expr::and(
            Expr::gt(Expr::input_prop("a"), Expr::constant(1i64)),
            Expr::lt(Expr::input_prop("b"), Expr::constant(2i64)),
        );
        let rewritten = rewrite(
            &cond,
            &|e| matches!(e.as_ref(), Expr::InputProp(p) if p == "a"),
            &|_| Expr::tag_prop("t", "x"),
        );
        assert_eq!(format!("{}", rewritten), "((t.x Gt Int(1)) And ($-.b Lt Int(2)))");
    }

    #[test]
    fn constant_folding() {
        let e = Expr::arith(
            ArithOp::Add,
            Expr::constant(1i64),
            Expr::arith(ArithOp::Mul, Expr::constant(2i64), Expr::constant(3i64)),
        );
        assert_eq!(e.fold_constant(), Some(Value::Int(7)));
        assert!(!Expr::input_prop("a").is_evaluable());
    }
}
