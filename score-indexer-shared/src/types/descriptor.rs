//! Per-ruleset record descriptors.
//!
//! The pipeline is parametric on a descriptor value, not on a record type:
//! each ruleset registers the table, the query fragments its rebuild scan
//! uses, and the row-decode function that produces a [`ScoreRecord`].
//! Adding a ruleset means adding one entry here.

use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::types::score::{Ruleset, ScoreRecord};

/// Query-shape and decode registration for one ruleset's score table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub ruleset: Ruleset,
    /// Source table holding this ruleset's scores.
    pub table: &'static str,
    /// Monotonic scan key column.
    pub cursor_column: &'static str,
    /// Column list selected by the rebuild scan and the live-id fetch.
    pub select_clause: &'static str,
    /// Expression yielding the scan upper bound, read once per rebuild.
    pub max_expression: &'static str,
    /// Optional extra predicate appended to the rebuild scan.
    pub extra_where: Option<&'static str>,
    /// Decodes one row selected through `select_clause`.
    pub decode: fn(&PgRow) -> Result<ScoreRecord, sqlx::Error>,
}

const SELECT_CLAUSE: &str =
    "id, user_id, total_score, accuracy, max_combo, rank, passed, hidden, deleted, created_at";

fn decode_score(ruleset: Ruleset, row: &PgRow) -> Result<ScoreRecord, sqlx::Error> {
    Ok(ScoreRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        ruleset,
        total_score: row.try_get("total_score")?,
        accuracy: row.try_get("accuracy")?,
        max_combo: row.try_get("max_combo")?,
        rank: row.try_get("rank")?,
        passed: row.try_get("passed")?,
        hidden: row.try_get("hidden")?,
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_osu(row: &PgRow) -> Result<ScoreRecord, sqlx::Error> {
    decode_score(Ruleset::Osu, row)
}

fn decode_taiko(row: &PgRow) -> Result<ScoreRecord, sqlx::Error> {
    decode_score(Ruleset::Taiko, row)
}

fn decode_catch(row: &PgRow) -> Result<ScoreRecord, sqlx::Error> {
    decode_score(Ruleset::Catch, row)
}

fn decode_mania(row: &PgRow) -> Result<ScoreRecord, sqlx::Error> {
    decode_score(Ruleset::Mania, row)
}

/// Returns the descriptor for a ruleset.
pub fn descriptor(ruleset: Ruleset) -> RecordDescriptor {
    let (table, decode): (&'static str, fn(&PgRow) -> Result<ScoreRecord, sqlx::Error>) =
        match ruleset {
            Ruleset::Osu => ("scores_osu", decode_osu),
            Ruleset::Taiko => ("scores_taiko", decode_taiko),
            Ruleset::Catch => ("scores_catch", decode_catch),
            Ruleset::Mania => ("scores_mania", decode_mania),
        };
    RecordDescriptor {
        ruleset,
        table,
        cursor_column: "id",
        select_clause: SELECT_CLAUSE,
        max_expression: "MAX(id)",
        extra_where: None,
        decode,
    }
}

/// Descriptors for every registered ruleset, in `mode` order.
pub fn descriptors() -> Vec<RecordDescriptor> {
    Ruleset::ALL.iter().copied().map(descriptor).collect()
}

impl RecordDescriptor {
    /// The logical alias this ruleset's indices sit behind, given the
    /// configured prefix.
    pub fn alias(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.ruleset)
    }
}
