//! # Score Indexer Repository
//!
//! This crate provides traits and implementations for the external systems
//! the indexer talks to: the search cluster (OpenSearch/Elasticsearch HTTP
//! API), the per-index metadata persisted in mapping `_meta`, and the shared
//! coordination store holding the current schema and the active-schema set.

pub mod errors;
pub mod index_manager;
pub mod interfaces;
pub mod memory;
pub mod metadata;
pub mod opensearch;
pub mod postgres;
pub mod types;

pub use errors::{CoordinationError, SearchIndexError};
pub use index_manager::{FoundIndex, IndexManager};
pub use interfaces::{CoordinationStore, SearchIndexProvider};
pub use memory::MemoryCoordinationStore;
pub use metadata::MetadataStore;
pub use opensearch::{index_name, OpenSearchProvider};
pub use postgres::PostgresCoordinationStore;
pub use types::{BulkItemError, BulkOutcome};
