//! PostgreSQL implementation of the coordination store.
//!
//! The shared key space lives in a single `coordination` table keyed by
//! `(key, member)`: the `current_schema` scalar holds at most one row, the
//! `active_schemas` set one row per member.

use async_trait::async_trait;
use sqlx::Row;

use crate::errors::CoordinationError;
use crate::interfaces::coordination_store::{ACTIVE_SCHEMAS_KEY, CURRENT_SCHEMA_KEY};
use crate::interfaces::CoordinationStore;

/// Postgres-backed coordination store.
pub struct PostgresCoordinationStore {
    pool: sqlx::PgPool,
}

impl PostgresCoordinationStore {
    /// Creates a new store over a configured pool. The `coordination` table
    /// must exist with primary key `(key, member)`.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoordinationStore for PostgresCoordinationStore {
    async fn get_schema(&self) -> Result<Option<String>, CoordinationError> {
        let row = sqlx::query("SELECT member FROM coordination WHERE key = $1")
            .bind(CURRENT_SCHEMA_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("member")))
    }

    async fn set_schema(&self, schema: &str) -> Result<(), CoordinationError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM coordination WHERE key = $1")
            .bind(CURRENT_SCHEMA_KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO coordination (key, member) VALUES ($1, $2)")
            .bind(CURRENT_SCHEMA_KEY)
            .bind(schema)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_schema(&self) -> Result<(), CoordinationError> {
        sqlx::query("DELETE FROM coordination WHERE key = $1")
            .bind(CURRENT_SCHEMA_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_active(&self, member: &str) -> Result<(), CoordinationError> {
        sqlx::query(
            "INSERT INTO coordination (key, member) VALUES ($1, $2) ON CONFLICT (key, member) DO NOTHING",
        )
        .bind(ACTIVE_SCHEMAS_KEY)
        .bind(member)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_active(&self, member: &str) -> Result<(), CoordinationError> {
        sqlx::query("DELETE FROM coordination WHERE key = $1 AND member = $2")
            .bind(ACTIVE_SCHEMAS_KEY)
            .bind(member)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active(&self) -> Result<Vec<String>, CoordinationError> {
        let rows = sqlx::query("SELECT member FROM coordination WHERE key = $1 ORDER BY member")
            .bind(ACTIVE_SCHEMAS_KEY)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("member")).collect())
    }
}
