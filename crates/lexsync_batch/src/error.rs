//! Error types for batch operations.

use thiserror::Error;

/// Result of one batched operation.
pub type BatchResult<T> = Result<T, BatchError>;

/// Why a batched operation did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The handler failed for the chunk this operation was in.
    #[error("batch handler failed: {0}")]
    Handler(String),

    /// The handler returned a different number of results than it was given.
    #[error("batch handler returned {actual} results for {expected} operations")]
    LengthMismatch {
        /// Operations in the chunk.
        expected: usize,
        /// Results returned.
        actual: usize,
    },

    /// The processor shut down before the operation completed.
    #[error("batch processor is closed")]
    Closed,
}
