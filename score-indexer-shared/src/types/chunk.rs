//! Chunk type - the unit of back-pressure and bulk dispatch.

use crate::types::score::ScoreRecord;

/// An ordered, non-empty, bounded batch of records bound for one bulk
/// request.
///
/// A chunk carries records to upsert and score ids to delete; either side
/// may be empty but not both. `last_cursor` is the highest cursor value in
/// the chunk and becomes the replay checkpoint once the bulk succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub adds: Vec<ScoreRecord>,
    pub deletes: Vec<i64>,
    pub last_cursor: i64,
}

impl Chunk {
    /// Build a chunk from adds and deletes, computing the cursor high-water
    /// mark. Returns `None` when both sides are empty.
    pub fn new(adds: Vec<ScoreRecord>, deletes: Vec<i64>) -> Option<Self> {
        let add_max = adds.iter().map(|r| r.cursor_value()).max();
        let delete_max = deletes.iter().copied().max();
        let last_cursor = add_max.into_iter().chain(delete_max).max()?;
        Some(Self {
            adds,
            deletes,
            last_cursor,
        })
    }

    /// Build an add-only chunk. Returns `None` for an empty input.
    pub fn from_adds(adds: Vec<ScoreRecord>) -> Option<Self> {
        Self::new(adds, Vec::new())
    }

    /// Total number of bulk actions this chunk produces.
    pub fn len(&self) -> usize {
        self.adds.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::score::Ruleset;
    use chrono::Utc;

    fn record(id: i64) -> ScoreRecord {
        ScoreRecord {
            id,
            user_id: 1,
            ruleset: Ruleset::Taiko,
            total_score: 0,
            accuracy: 1.0,
            max_combo: 0,
            rank: "D".to_string(),
            passed: true,
            hidden: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_chunk_is_rejected() {
        assert!(Chunk::new(Vec::new(), Vec::new()).is_none());
    }

    #[test]
    fn last_cursor_spans_adds_and_deletes() {
        let chunk = Chunk::new(vec![record(5), record(9)], vec![12, 3]).unwrap();
        assert_eq!(chunk.last_cursor, 12);
        assert_eq!(chunk.len(), 4);

        let chunk = Chunk::from_adds(vec![record(42)]).unwrap();
        assert_eq!(chunk.last_cursor, 42);
    }
}
