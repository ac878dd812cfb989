//! Error kinds surfaced by the optimizer. "Pattern matched but the rewrite
//! declined" is not an error; rules return
//! [`TransformResult::no_transform`](crate::rule::TransformResult::no_transform)
//! for that.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptError {
    /// The index selector accepted a filter shape but ran out of candidate
    /// indexes for it.
    #[error("no applicable index found")]
    IndexNotFound,

    /// Inputs violated an assumption of filter-to-column-hint lowering,
    /// e.g. a range scan over a boolean column.
    #[error("semantic error: {0}")]
    SemanticError(String),

    /// The plan handed to the optimizer is malformed.
    #[error("plan error: {0}")]
    PlanError(String),

    /// A broken invariant inside the optimizer itself.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = OptError> = std::result::Result<T, E>;
