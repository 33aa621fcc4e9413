//! OpenSearch-backed search cluster implementation.

pub mod index_config;
pub mod provider;

pub use index_config::{index_name, load_mapping, INDEX_SUFFIX_FORMAT};
pub use provider::OpenSearchProvider;
