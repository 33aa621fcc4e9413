//! Coordination store error types.

use thiserror::Error;

/// Errors from the shared coordination store.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Underlying database failure.
    #[error("Coordination database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store returned a value the caller cannot interpret.
    #[error("Coordination value error: {0}")]
    Value(String),
}

impl CoordinationError {
    /// Create a value error.
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
}
