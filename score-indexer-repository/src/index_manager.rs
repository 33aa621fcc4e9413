//! Find-or-create resolution of the physical index behind an alias.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::index_name;
use score_indexer_shared::IndexMetadata;

/// Resolution result: the physical index an indexer run will write to.
#[derive(Debug, Clone)]
pub struct FoundIndex {
    pub index: String,
    pub metadata: IndexMetadata,
    /// Whether the alias already points at this index.
    pub aliased: bool,
}

/// Resolves the target physical index for an alias at one schema generation.
pub struct IndexManager {
    provider: Arc<dyn SearchIndexProvider>,
    schema_tag: String,
}

impl IndexManager {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, schema_tag: impl Into<String>) -> Self {
        Self {
            provider,
            schema_tag: schema_tag.into(),
        }
    }

    /// Find the existing index for `alias` at the configured schema, without
    /// creating one.
    ///
    /// Enumerates `{alias}_*` and keeps the indices whose mapping metadata
    /// carries the configured schema tag. An aliased match wins; otherwise
    /// the newest suffix does (ties broken by latest `updated_at`).
    pub async fn find(&self, alias: &str) -> Result<Option<FoundIndex>, SearchIndexError> {
        let mut candidates = Vec::new();
        for index in self.provider.list_indices(&format!("{alias}_*")).await? {
            if let Some(meta) = self.provider.get_mapping_meta(&index).await? {
                if meta.schema == self.schema_tag {
                    candidates.push((index, meta));
                }
            }
        }

        let targets = self.provider.get_alias_targets(alias).await?;
        if let Some((index, metadata)) = candidates
            .iter()
            .find(|(index, _)| targets.contains(index))
            .cloned()
        {
            debug!(alias = %alias, index = %index, "Resuming aliased index");
            return Ok(Some(FoundIndex {
                index,
                metadata,
                aliased: true,
            }));
        }

        // Lexicographically greatest suffix is the newest; updated_at
        // settles equal suffixes.
        candidates.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
        });
        Ok(candidates.into_iter().next().map(|(index, metadata)| {
            debug!(alias = %alias, index = %index, "Resuming unaliased index");
            FoundIndex {
                index,
                metadata,
                aliased: false,
            }
        }))
    }

    /// Find the index to resume, or create a fresh one. With `force_new`,
    /// reuse is skipped entirely and a fresh index is cut.
    pub async fn find_or_create(
        &self,
        alias: &str,
        force_new: bool,
    ) -> Result<FoundIndex, SearchIndexError> {
        if !force_new {
            if let Some(found) = self.find(alias).await? {
                return Ok(found);
            }
        }

        let index = index_name(alias, Utc::now());
        self.provider.create_index(&index).await?;
        let metadata = IndexMetadata::new(&self.schema_tag);
        self.provider.put_mapping_meta(&index, &metadata).await?;
        info!(alias = %alias, index = %index, schema = %self.schema_tag, "Created new index");

        Ok(FoundIndex {
            index,
            metadata,
            aliased: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BulkOutcome;
    use async_trait::async_trait;
    use score_indexer_shared::ScoreRecord;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock cluster: a map of index name -> metadata plus alias targets.
    struct MockProvider {
        indices: Mutex<HashMap<String, IndexMetadata>>,
        aliased: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                indices: Mutex::new(HashMap::new()),
                aliased: Mutex::new(Vec::new()),
            }
        }

        fn with_index(self, name: &str, schema: &str) -> Self {
            self.indices
                .lock()
                .unwrap()
                .insert(name.to_string(), IndexMetadata::new(schema));
            self
        }

        fn with_alias(self, target: &str) -> Self {
            self.aliased.lock().unwrap().push(target.to_string());
            self
        }
    }

    #[async_trait]
    impl SearchIndexProvider for MockProvider {
        async fn create_index(&self, index: &str) -> Result<(), SearchIndexError> {
            self.indices
                .lock()
                .unwrap()
                .insert(index.to_string(), IndexMetadata::new(""));
            Ok(())
        }

        async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .indices
                .lock()
                .unwrap()
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn bulk(
            &self,
            _index: &str,
            _adds: &[ScoreRecord],
            _deletes: &[i64],
        ) -> Result<BulkOutcome, SearchIndexError> {
            Ok(BulkOutcome::default())
        }

        async fn get_alias_targets(&self, _alias: &str) -> Result<Vec<String>, SearchIndexError> {
            Ok(self.aliased.lock().unwrap().clone())
        }

        async fn update_alias(
            &self,
            _alias: &str,
            new_index: &str,
            _close_previous: bool,
        ) -> Result<(), SearchIndexError> {
            let mut aliased = self.aliased.lock().unwrap();
            aliased.clear();
            aliased.push(new_index.to_string());
            Ok(())
        }

        async fn close_index(&self, _index: &str) -> Result<(), SearchIndexError> {
            Ok(())
        }

        async fn get_mapping_meta(
            &self,
            index: &str,
        ) -> Result<Option<IndexMetadata>, SearchIndexError> {
            Ok(self.indices.lock().unwrap().get(index).cloned())
        }

        async fn put_mapping_meta(
            &self,
            index: &str,
            meta: &IndexMetadata,
        ) -> Result<(), SearchIndexError> {
            self.indices
                .lock()
                .unwrap()
                .insert(index.to_string(), meta.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn prefers_aliased_match() {
        let provider = Arc::new(
            MockProvider::new()
                .with_index("scores_osu_20240101000000", "v7")
                .with_index("scores_osu_20240201000000", "v7")
                .with_alias("scores_osu_20240101000000"),
        );
        let manager = IndexManager::new(provider, "v7");
        let found = manager.find_or_create("scores_osu", false).await.unwrap();
        assert_eq!(found.index, "scores_osu_20240101000000");
        assert!(found.aliased);
    }

    #[tokio::test]
    async fn falls_back_to_newest_unaliased_match() {
        let provider = Arc::new(
            MockProvider::new()
                .with_index("scores_osu_20240101000000", "v7")
                .with_index("scores_osu_20240201000000", "v7"),
        );
        let manager = IndexManager::new(provider, "v7");
        let found = manager.find_or_create("scores_osu", false).await.unwrap();
        assert_eq!(found.index, "scores_osu_20240201000000");
        assert!(!found.aliased);
    }

    #[tokio::test]
    async fn skips_other_schema_generations() {
        let provider = Arc::new(
            MockProvider::new()
                .with_index("scores_osu_20240101000000", "v6")
                .with_alias("scores_osu_20240101000000"),
        );
        let manager = IndexManager::new(provider.clone(), "v7");
        let found = manager.find_or_create("scores_osu", false).await.unwrap();
        assert!(!found.aliased);
        assert_ne!(found.index, "scores_osu_20240101000000");
        assert_eq!(found.metadata.schema, "v7");
    }

    #[tokio::test]
    async fn force_new_always_creates() {
        let provider = Arc::new(
            MockProvider::new()
                .with_index("scores_osu_20240101000000", "v7")
                .with_alias("scores_osu_20240101000000"),
        );
        let manager = IndexManager::new(provider.clone(), "v7");
        let found = manager.find_or_create("scores_osu", true).await.unwrap();
        assert_ne!(found.index, "scores_osu_20240101000000");
        assert_eq!(provider.indices.lock().unwrap().len(), 2);
    }
}
