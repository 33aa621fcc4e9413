//! Index metadata persisted inside the search cluster.
//!
//! Every physical index carries an `IndexMetadata` blob in its mapping
//! `_meta` object: the replay checkpoint, the schema generation the index
//! was built for, and its lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a physical index.
///
/// States only move forward: `Building -> Ready -> Aliased -> Closed`.
/// A non-prep rebuild commits straight from `Building` to `Aliased`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    #[default]
    Building,
    Ready,
    Aliased,
    Closed,
}

impl IndexState {
    /// Whether moving to `next` respects the forward-only state machine.
    /// Re-asserting the current state is a no-op and always allowed.
    pub fn can_transition(&self, next: IndexState) -> bool {
        next >= *self
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexState::Building => "building",
            IndexState::Ready => "ready",
            IndexState::Aliased => "aliased",
            IndexState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Progress and lifecycle metadata for one physical index.
///
/// `last_id` is a replay checkpoint, not a durability claim about strictly
/// lower ids: bulk requests from parallel workers may commit out of order,
/// and resuming from `last_id` re-indexes at most one window of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Highest cursor value successfully dispatched. Non-decreasing.
    #[serde(default)]
    pub last_id: i64,
    /// Work-queue position to rewind to when this index takes the alias.
    #[serde(default)]
    pub reset_queue_to: Option<i64>,
    /// Schema generation this index was built for. Immutable after creation.
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub state: IndexState,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl IndexMetadata {
    /// Fresh metadata for a just-created index at the given schema.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            last_id: 0,
            reset_queue_to: None,
            schema: schema.into(),
            state: IndexState::Building,
            updated_at: Utc::now(),
        }
    }

    /// Fold a dispatched cursor value into the checkpoint, keeping `last_id`
    /// monotonically non-decreasing.
    pub fn observe_cursor(&mut self, cursor: i64) {
        if cursor > self.last_id {
            self.last_id = cursor;
            self.updated_at = Utc::now();
        }
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: IndexState) -> bool {
        if !self.state.can_transition(next) {
            return false;
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(IndexState::Building.can_transition(IndexState::Ready));
        assert!(IndexState::Building.can_transition(IndexState::Aliased));
        assert!(IndexState::Aliased.can_transition(IndexState::Aliased));
        assert!(!IndexState::Aliased.can_transition(IndexState::Ready));
        assert!(!IndexState::Closed.can_transition(IndexState::Building));
    }

    #[test]
    fn observe_cursor_is_monotonic() {
        let mut meta = IndexMetadata::new("v7");
        meta.observe_cursor(100);
        meta.observe_cursor(50);
        assert_eq!(meta.last_id, 100);
        meta.observe_cursor(150);
        assert_eq!(meta.last_id, 150);
    }

    #[test]
    fn transition_rejects_backwards_moves() {
        let mut meta = IndexMetadata::new("v7");
        assert!(meta.transition(IndexState::Aliased));
        assert!(!meta.transition(IndexState::Building));
        assert_eq!(meta.state, IndexState::Aliased);
    }

    #[test]
    fn absent_fields_default_on_deserialize() {
        let meta: IndexMetadata = serde_json::from_value(serde_json::json!({
            "schema": "v7"
        }))
        .unwrap();
        assert_eq!(meta.last_id, 0);
        assert_eq!(meta.reset_queue_to, None);
        assert_eq!(meta.state, IndexState::Building);
    }

    #[test]
    fn state_serializes_lowercase() {
        let value = serde_json::to_value(IndexState::Aliased).unwrap();
        assert_eq!(value, "aliased");
    }
}
