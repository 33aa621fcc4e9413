//! In-memory coordination store.
//!
//! Backs tests and local development; state lives for the lifetime of the
//! process only.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::CoordinationError;
use crate::interfaces::CoordinationStore;

/// In-memory implementation of [`CoordinationStore`].
#[derive(Default)]
pub struct MemoryCoordinationStore {
    schema: Mutex<Option<String>>,
    active: Mutex<BTreeSet<String>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn get_schema(&self) -> Result<Option<String>, CoordinationError> {
        Ok(self.schema.lock().unwrap().clone())
    }

    async fn set_schema(&self, schema: &str) -> Result<(), CoordinationError> {
        *self.schema.lock().unwrap() = Some(schema.to_string());
        Ok(())
    }

    async fn clear_schema(&self) -> Result<(), CoordinationError> {
        *self.schema.lock().unwrap() = None;
        Ok(())
    }

    async fn add_active(&self, member: &str) -> Result<(), CoordinationError> {
        self.active.lock().unwrap().insert(member.to_string());
        Ok(())
    }

    async fn remove_active(&self, member: &str) -> Result<(), CoordinationError> {
        self.active.lock().unwrap().remove(member);
        Ok(())
    }

    async fn active(&self) -> Result<Vec<String>, CoordinationError> {
        Ok(self.active.lock().unwrap().iter().cloned().collect())
    }
}
