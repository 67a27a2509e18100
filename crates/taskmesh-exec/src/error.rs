//! Execution context error types.

use thiserror::Error;

use crate::context::ContextAddr;

/// Result type alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur when submitting work to an execution context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("execution context unavailable: {0}")]
    Unavailable(ContextAddr),
}
