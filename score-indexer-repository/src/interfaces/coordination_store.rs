//! Coordination store trait definition.
//!
//! A thin contract over the shared key space indexer processes coordinate
//! through: the `current_schema` scalar and the `active_schemas` set.

use async_trait::async_trait;

use crate::errors::CoordinationError;

/// Key holding the schema generation readers should currently see.
pub const CURRENT_SCHEMA_KEY: &str = "current_schema";

/// Key holding the set of index names currently accepting writes.
pub const ACTIVE_SCHEMAS_KEY: &str = "active_schemas";

/// Shared key-value coordination between indexer processes.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read `current_schema`, if set.
    async fn get_schema(&self) -> Result<Option<String>, CoordinationError>;

    /// Set `current_schema`.
    async fn set_schema(&self, schema: &str) -> Result<(), CoordinationError>;

    /// Clear `current_schema`.
    async fn clear_schema(&self) -> Result<(), CoordinationError>;

    /// Add a member to the `active_schemas` set. Idempotent.
    async fn add_active(&self, member: &str) -> Result<(), CoordinationError>;

    /// Remove a member from the `active_schemas` set. Idempotent.
    async fn remove_active(&self, member: &str) -> Result<(), CoordinationError>;

    /// List the `active_schemas` set.
    async fn active(&self) -> Result<Vec<String>, CoordinationError>;
}
