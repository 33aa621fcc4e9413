//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate. Bulk payloads are NDJSON action/source
//! pairs; per-item responses are classified into a [`BulkOutcome`] so the
//! dispatcher can tell backpressure apart from fatal item errors.

use std::path::Path;

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{
        IndicesCloseParts, IndicesCreateParts, IndicesGetAliasParts, IndicesGetMappingParts,
        IndicesGetParts, IndicesPutMappingParts,
    },
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::load_mapping;
use crate::types::BulkOutcome;
use score_indexer_shared::{IndexMetadata, ScoreRecord};

/// OpenSearch provider implementation.
///
/// Holds one shared connection pool per process and the mapping body used
/// when cutting new physical indices.
pub struct OpenSearchProvider {
    client: OpenSearch,
    mapping: Value,
}

impl OpenSearchProvider {
    /// Create a new provider connected to the specified URL, loading the
    /// index mapping from `mapping_path`.
    pub async fn new(url: &str, mapping_path: &Path) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let mapping = load_mapping(mapping_path)?;

        info!(
            url = %url,
            mapping = %mapping_path.display(),
            "Created OpenSearch provider"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            mapping,
        })
    }

    /// Build the NDJSON action list for one chunk.
    fn bulk_body(
        adds: &[ScoreRecord],
        deletes: &[i64],
    ) -> Result<Vec<JsonBody<Value>>, SearchIndexError> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(adds.len() * 2 + deletes.len());
        for record in adds {
            body.push(json!({"index": {"_id": record.id.to_string()}}).into());
            let doc = serde_json::to_value(record)
                .map_err(|e| SearchIndexError::serialization(e.to_string()))?;
            body.push(doc.into());
        }
        for id in deletes {
            body.push(json!({"delete": {"_id": id.to_string()}}).into());
        }
        Ok(body)
    }

    /// Classify the per-item section of a bulk response.
    fn classify_bulk_response(response: &Value) -> Result<BulkOutcome, SearchIndexError> {
        let items = response["items"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("bulk response has no items array"))?;

        let mut outcome = BulkOutcome::default();
        for item in items {
            // Each item is an object with a single action key: index or delete.
            let action = item
                .as_object()
                .and_then(|obj| obj.values().next())
                .ok_or_else(|| SearchIndexError::parse("bulk item is not an object"))?;

            let id = action["_id"].as_str().unwrap_or_default();
            let status = action["status"].as_u64().unwrap_or(0) as u16;
            let error_type = action["error"]["type"].as_str();
            let reason = action["error"]["reason"].as_str();
            outcome.record_item(id, status, error_type, reason);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    async fn create_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(self.mapping.clone())
            .wait_for_active_shards("all")
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Index creation failed");
            return Err(SearchIndexError::index_creation(format!(
                "Create {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Created index with all shards active");
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[pattern]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::parse(format!(
                "List indices {} failed with status {}: {}",
                pattern, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        let names = body
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        Ok(names)
    }

    async fn bulk(
        &self,
        index: &str,
        adds: &[ScoreRecord],
        deletes: &[i64],
    ) -> Result<BulkOutcome, SearchIndexError> {
        let body = Self::bulk_body(adds, deletes)?;
        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchIndexError::bulk(format!(
                "Bulk to {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        let outcome = Self::classify_bulk_response(&body)?;

        debug!(
            index = %index,
            succeeded = outcome.succeeded,
            rejected = outcome.rejected,
            item_errors = outcome.item_errors.len(),
            "Bulk request classified"
        );
        Ok(outcome)
    }

    async fn get_alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::alias(format!(
                "Get alias {} failed with status {}: {}",
                alias, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        Ok(body
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_alias(
        &self,
        alias: &str,
        new_index: &str,
        close_previous: bool,
    ) -> Result<(), SearchIndexError> {
        let previous = self.get_alias_targets(alias).await?;

        // Remove and add are batched into one request so readers never
        // observe an alias with zero targets.
        let mut actions: Vec<Value> = previous
            .iter()
            .map(|target| json!({"remove": {"index": target, "alias": alias}}))
            .collect();
        actions.push(json!({"add": {"index": new_index, "alias": alias}}));

        let response = self
            .client
            .indices()
            .update_aliases()
            .body(json!({ "actions": actions }))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(alias = %alias, new_index = %new_index, status = %status, body = %error_body, "Alias update failed");
            return Err(SearchIndexError::alias(format!(
                "Alias update {} -> {} failed with status {}: {}",
                alias, new_index, status, error_body
            )));
        }

        info!(alias = %alias, new_index = %new_index, removed = previous.len(), "Alias updated");

        if close_previous {
            for target in previous.iter().filter(|t| t.as_str() != new_index) {
                if let Err(e) = self.close_index(target).await {
                    warn!(index = %target, error = %e, "Failed to close previous alias target");
                }
            }
        }

        Ok(())
    }

    async fn close_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .close(IndicesCloseParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::alias(format!(
                "Close {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Closed index");
        Ok(())
    }

    async fn get_mapping_meta(
        &self,
        index: &str,
    ) -> Result<Option<IndexMetadata>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::mapping(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::mapping(format!(
                "Get mapping {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        let meta = body
            .as_object()
            .and_then(|obj| obj.values().next())
            .and_then(|entry| entry.pointer("/mappings/_meta"))
            .cloned();

        match meta {
            Some(value) if !value.is_null() => {
                let meta: IndexMetadata = serde_json::from_value(value)
                    .map_err(|e| SearchIndexError::parse(e.to_string()))?;
                Ok(Some(meta))
            }
            _ => Ok(None),
        }
    }

    async fn put_mapping_meta(
        &self,
        index: &str,
        meta: &IndexMetadata,
    ) -> Result<(), SearchIndexError> {
        let meta_value =
            serde_json::to_value(meta).map_err(|e| SearchIndexError::serialization(e.to_string()))?;

        // Only _meta is sent; the cluster merges it into the mapping without
        // touching field definitions.
        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(json!({ "_meta": meta_value }))
            .send()
            .await
            .map_err(|e| SearchIndexError::mapping(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Metadata write failed");
            return Err(SearchIndexError::mapping(format!(
                "Put mapping meta for {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        debug!(index = %index, last_id = meta.last_id, state = %meta.state, "Metadata persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{INDEX_CLOSED_TYPE, REJECTED_EXECUTION_TYPE};

    #[test]
    fn classify_mixed_bulk_response() {
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 200}},
                {"index": {"_id": "2", "status": 429, "error": {"type": REJECTED_EXECUTION_TYPE, "reason": "queue full"}}},
                {"delete": {"_id": "3", "status": 200}},
                {"index": {"_id": "4", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}}
            ]
        });
        let outcome = OpenSearchProvider::classify_bulk_response(&response).unwrap();
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.item_errors.len(), 1);
        assert_eq!(outcome.item_errors[0].id, "4");
        assert!(!outcome.index_closed);
    }

    #[test]
    fn classify_index_closed_response() {
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 400, "error": {"type": INDEX_CLOSED_TYPE, "reason": "closed"}}}
            ]
        });
        let outcome = OpenSearchProvider::classify_bulk_response(&response).unwrap();
        assert!(outcome.index_closed);
        assert_eq!(outcome.succeeded, 0);
    }

    #[test]
    fn classify_rejects_malformed_response() {
        let response = json!({"took": 3});
        assert!(OpenSearchProvider::classify_bulk_response(&response).is_err());
    }

    #[test]
    fn bulk_body_interleaves_actions_and_sources() {
        let record = ScoreRecord {
            id: 7,
            user_id: 1,
            ruleset: score_indexer_shared::Ruleset::Osu,
            total_score: 10,
            accuracy: 1.0,
            max_combo: 3,
            rank: "A".to_string(),
            passed: true,
            hidden: false,
            deleted: false,
            created_at: chrono::Utc::now(),
        };
        let body = OpenSearchProvider::bulk_body(&[record], &[9]).unwrap();
        // One action+source pair for the add, one action for the delete.
        assert_eq!(body.len(), 3);
    }
}
