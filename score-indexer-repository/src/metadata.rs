//! Metadata store over the search cluster's mapping `_meta`.
//!
//! All per-index progress state lives inside the index itself, so the
//! checkpoint travels with the index through alias switches and restores.

use std::sync::Arc;

use tracing::debug;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use score_indexer_shared::IndexMetadata;

/// Reads and writes [`IndexMetadata`] for physical indices.
#[derive(Clone)]
pub struct MetadataStore {
    provider: Arc<dyn SearchIndexProvider>,
}

impl MetadataStore {
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self { provider }
    }

    /// Load the metadata of `index`. Absent fields default; an index that
    /// has never been written returns `None`.
    pub async fn load(&self, index: &str) -> Result<Option<IndexMetadata>, SearchIndexError> {
        let meta = self.provider.get_mapping_meta(index).await?;
        debug!(index = %index, found = meta.is_some(), "Loaded index metadata");
        Ok(meta)
    }

    /// Persist `meta` for `index`, merging into the existing mapping.
    /// Idempotent by value.
    pub async fn save(&self, index: &str, meta: &IndexMetadata) -> Result<(), SearchIndexError> {
        self.provider.put_mapping_meta(index, meta).await
    }
}
