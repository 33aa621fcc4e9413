//! Search index error types.
//!
//! Unified error type for all search cluster operations, covering transport
//! failures and non-retryable response errors. Backpressure rejections and
//! index-closed signals are NOT errors here; they are classified per item in
//! [`crate::types::BulkOutcome`] so the dispatcher can react to them.

use thiserror::Error;

/// Unified errors from search cluster operations.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Failed to establish a connection to the search cluster.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to create a physical index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// A bulk request failed as a whole (transport or non-2xx response).
    #[error("Bulk request error: {0}")]
    BulkRequestError(String),

    /// Failed to read or update an alias.
    #[error("Alias error: {0}")]
    AliasError(String),

    /// Failed to read or write mapping metadata.
    #[error("Mapping error: {0}")]
    MappingError(String),

    /// Failed to parse a response from the search cluster.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize a request body.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SearchIndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a bulk request error.
    pub fn bulk(msg: impl Into<String>) -> Self {
        Self::BulkRequestError(msg.into())
    }

    /// Create an alias error.
    pub fn alias(msg: impl Into<String>) -> Self {
        Self::AliasError(msg.into())
    }

    /// Create a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::MappingError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }
}
