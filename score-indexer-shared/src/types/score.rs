//! Score record types for the search index.
//!
//! This module defines the record shape projected from the scores database
//! into the search cluster. A single shape with a ruleset discriminator
//! covers all game modes; per-ruleset query text lives in the descriptor
//! registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Game ruleset a score was set in.
///
/// Serialized by name in search documents; the numeric value matches the
/// `mode` column of the work-queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ruleset {
    Osu,
    Taiko,
    Catch,
    Mania,
}

impl Ruleset {
    /// All rulesets, in `mode` order.
    pub const ALL: [Ruleset; 4] = [Ruleset::Osu, Ruleset::Taiko, Ruleset::Catch, Ruleset::Mania];

    /// Returns the ruleset name used in alias names and documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ruleset::Osu => "osu",
            Ruleset::Taiko => "taiko",
            Ruleset::Catch => "catch",
            Ruleset::Mania => "mania",
        }
    }

    /// Numeric `mode` value stored in the work-queue table.
    pub fn mode(&self) -> i16 {
        match self {
            Ruleset::Osu => 0,
            Ruleset::Taiko => 1,
            Ruleset::Catch => 2,
            Ruleset::Mania => 3,
        }
    }

    /// Resolve a ruleset from its numeric `mode` value.
    pub fn from_mode(mode: i16) -> Option<Ruleset> {
        match mode {
            0 => Some(Ruleset::Osu),
            1 => Some(Ruleset::Taiko),
            2 => Some(Ruleset::Catch),
            3 => Some(Ruleset::Mania),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document representation of a score as indexed in the search cluster.
///
/// The score id doubles as the document `_id` and as the monotonic cursor
/// value for rebuild scans. Records are upserted idempotently by id, so
/// replaying a chunk after a crash is harmless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    pub id: i64,
    pub user_id: i64,
    pub ruleset: Ruleset,
    pub total_score: i64,
    pub accuracy: f64,
    pub max_combo: i32,
    pub rank: String,
    pub passed: bool,
    /// Hidden scores stay in the database but must not be searchable.
    #[serde(skip_serializing, default)]
    pub hidden: bool,
    #[serde(skip_serializing, default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// The monotonic scan key of this record.
    pub fn cursor_value(&self) -> i64 {
        self.id
    }

    /// Whether this record belongs in the index (upsert) or not (delete).
    pub fn should_index(&self) -> bool {
        self.passed && !self.hidden && !self.deleted
    }
}
