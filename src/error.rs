//! Error types for vexec query execution.

use arrow::error::ArrowError;
use thiserror::Error;

/// Result type alias using [`VexecError`].
pub type Result<T> = std::result::Result<T, VexecError>;

/// Error types for query execution.
///
/// Query errors are user facing and terminate the running query. The
/// remaining variants indicate a malformed plan or an expression failure.
#[derive(Debug, Error)]
pub enum VexecError {
    // ==================== Query Errors ====================
    /// User-facing query error (bad limit value, row count exceeded, etc.).
    #[error("Query error: {0}")]
    QueryError(String),

    // ==================== Contract Errors ====================
    /// Invariant violation in plan or vector construction.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `next()` called on an iterator without a preceding `has_next() == true`.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    // ==================== Evaluation Errors ====================
    /// Type mismatch errors.
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Invalid expression during query execution.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Unsupported operation in the current context.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Division by zero in expression evaluation.
    #[error("Division by zero")]
    DivisionByZero,

    /// Integer overflow in arithmetic or aggregation.
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    // ==================== Storage Errors ====================
    /// Error raised by the arrow columnar layer.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error serializing describe output.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VexecError {
    /// Creates a query error from a message.
    pub fn query(message: impl Into<String>) -> Self {
        VexecError::QueryError(message.into())
    }

    /// Creates a contract violation error from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        VexecError::InvalidArgument(message.into())
    }

    /// Returns true if this is a user-facing query error.
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, VexecError::QueryError(_))
    }
}
