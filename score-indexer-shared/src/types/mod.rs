//! Type definitions shared across the indexer crates.

pub mod chunk;
pub mod descriptor;
pub mod metadata;
pub mod score;

pub use chunk::Chunk;
pub use descriptor::{descriptor, descriptors, RecordDescriptor};
pub use metadata::{IndexMetadata, IndexState};
pub use score::{Ruleset, ScoreRecord};
