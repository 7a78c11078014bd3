//! Errors raised by distribution construction and matrix numerics.

use thiserror::Error;

/// Errors from the distribution library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("{what} still violated in {count} dimension(s)")]
    ConstraintViolated { what: &'static str, count: usize },

    #[error("matrix is not positive definite (largest eigenvalue {max_eigenvalue})")]
    NotPositiveDefinite { max_eigenvalue: f64 },
}
