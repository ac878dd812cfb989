//! Execution-plan representation for the quiver graph database: plan
//! nodes, expressions, symbols, and the metadata catalog the optimizer
//! consumes.

#![allow(clippy::new_without_default)]

pub mod context;
pub mod expr;
pub mod hints;
pub mod meta;
pub mod plan;
pub mod symbols;
pub mod value;

pub use context::{is_anon_var, QueryContext};
pub use expr::{Expr, ExprKind, ExprRef, LogicalOp, RelOp, UnaryOp};
pub use plan::{NodeDetail, PlanKind, PlanNode, PlanNodeId};
pub use value::Value;
