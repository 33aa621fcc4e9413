//! # Score Indexer Shared
//!
//! Shared types for the score search indexer - record and chunk shapes,
//! per-ruleset record descriptors, and the index metadata persisted inside
//! the search cluster.

pub mod types;

pub use types::chunk::Chunk;
pub use types::descriptor::{descriptor, descriptors, RecordDescriptor};
pub use types::metadata::{IndexMetadata, IndexState};
pub use types::score::{Ruleset, ScoreRecord};
