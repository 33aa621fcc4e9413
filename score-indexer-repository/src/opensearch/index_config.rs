//! Index naming and mapping configuration.
//!
//! Physical index names are formed as `{alias}_{suffix}` where the suffix is
//! a UTC timestamp; the mapping body is read from an on-disk JSON file so
//! operators can evolve the schema without a rebuild of the binary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::SearchIndexError;

/// Timestamp format of the physical index suffix.
pub const INDEX_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// Build the physical index name for an alias at a point in time.
///
/// The name is immutable once the index is created; a later rebuild at the
/// same alias gets a fresh suffix.
pub fn index_name(alias: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", alias, at.format(INDEX_SUFFIX_FORMAT))
}

/// Load the index settings and mappings from a JSON file.
pub fn load_mapping(path: &Path) -> Result<Value, SearchIndexError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SearchIndexError::index_creation(format!(
            "Failed to read mapping file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        SearchIndexError::parse(format!(
            "Mapping file {} is not valid JSON: {}",
            path.display(),
            e
        ))
    })
}
