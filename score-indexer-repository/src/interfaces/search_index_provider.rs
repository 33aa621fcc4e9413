//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search cluster operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch)
//! and mock implementations in tests.

use async_trait::async_trait;

use crate::errors::SearchIndexError;
use crate::types::BulkOutcome;
use score_indexer_shared::{IndexMetadata, ScoreRecord};

/// Abstracts the underlying search cluster.
///
/// Implementations are injected into the pipeline components to enable
/// dependency injection and testing with mock clusters. The client is
/// thread-safe and shared per process behind an `Arc`.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Create a physical index from the configured mapping, waiting for all
    /// shards to become active before returning.
    async fn create_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Enumerate physical indices matching a wildcard pattern.
    ///
    /// A pattern with no matches yields an empty vector, not an error.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Issue one bulk request carrying upserts and deletes for `index`.
    ///
    /// Transport failures and non-2xx responses are errors; per-item
    /// failures are classified into the returned [`BulkOutcome`].
    async fn bulk(
        &self,
        index: &str,
        adds: &[ScoreRecord],
        deletes: &[i64],
    ) -> Result<BulkOutcome, SearchIndexError>;

    /// Physical indices the alias currently resolves to.
    async fn get_alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Atomically repoint `alias` at `new_index`, removing it from all
    /// current targets in the same request. With `close_previous`, each
    /// prior target other than `new_index` is closed afterwards; a failure
    /// to close is logged but not fatal.
    async fn update_alias(
        &self,
        alias: &str,
        new_index: &str,
        close_previous: bool,
    ) -> Result<(), SearchIndexError>;

    /// Close a physical index.
    async fn close_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Read the `_meta` object of an index mapping. `None` when the index
    /// carries no metadata.
    async fn get_mapping_meta(
        &self,
        index: &str,
    ) -> Result<Option<IndexMetadata>, SearchIndexError>;

    /// Write the `_meta` object of an index mapping, merging into the
    /// existing mapping without clobbering field definitions.
    async fn put_mapping_meta(
        &self,
        index: &str,
        meta: &IndexMetadata,
    ) -> Result<(), SearchIndexError>;
}
