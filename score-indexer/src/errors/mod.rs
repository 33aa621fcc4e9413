//! Error types for the indexer pipeline.

use thiserror::Error;

use score_indexer_repository::{CoordinationError, SearchIndexError};

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// No schema version was configured.
    #[error("No schema version configured; set SCHEMA_VERSION or pass --schema")]
    MissingSchema,

    /// Configuration error other than the schema tag.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Persisted index schema does not match the configured one: another
    /// process owns this alias generation.
    #[error("Schema version mismatch: index was built for {actual}, configured {expected}")]
    VersionMismatch { expected: String, actual: String },

    /// The target index was closed under us; the run is abandoned.
    #[error("Index {0} was closed; run abandoned")]
    IndexClosed(String),

    /// Source database failure that escaped the local retry policy.
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Search cluster failure.
    #[error("Search cluster error: {0}")]
    Search(#[from] SearchIndexError),

    /// Coordination store failure.
    #[error("Coordination store error: {0}")]
    Coordination(#[from] CoordinationError),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The run was cancelled from above.
    #[error("Cancelled")]
    Cancelled,
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a version mismatch error.
    pub fn version_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::VersionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
