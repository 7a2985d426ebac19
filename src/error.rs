use thiserror::Error;

/// Errors raised while building, scheduling or evaluating a computation.
///
/// Shape and arity problems are detected eagerly, before any task reaches
/// the worker pool, and always surface synchronously to the caller of
/// [`crate::engine::LinearAlgebraEngine::run`]. Failures inside a scheduled
/// row task are captured by the pool and re-raised once the batch barrier
/// has drained.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("index {index} out of bounds for vector of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("{op} expects {expected} operand(s), got {found}")]
    Arity {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("computation tree cannot be resolved any further")]
    UnresolvableTree,

    #[error("executor interrupted: {0}")]
    Interrupted(String),

    #[error("worker task panicked: {0}")]
    TaskPanic(String),
}

impl EngineError {
    /// Shorthand for a [`EngineError::DimensionMismatch`] with a formatted
    /// description of the two offending shapes.
    pub(crate) fn dims(context: &str, left: impl std::fmt::Display, right: impl std::fmt::Display) -> Self {
        EngineError::DimensionMismatch(format!("{}: {} vs {}", context, left, right))
    }
}
