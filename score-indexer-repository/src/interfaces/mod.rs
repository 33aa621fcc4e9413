//! Trait definitions for the external systems the indexer depends on.

pub mod coordination_store;
pub mod search_index_provider;

pub use coordination_store::CoordinationStore;
pub use search_index_provider::SearchIndexProvider;
