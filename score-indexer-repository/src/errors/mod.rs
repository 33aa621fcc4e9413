//! Error types for the repository crate.

pub mod coordination_error;
pub mod search_index_error;

pub use coordination_error::CoordinationError;
pub use search_index_error::SearchIndexError;
