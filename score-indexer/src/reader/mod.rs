//! Source readers.
//!
//! Two modes produce chunks into the bounded channel the dispatcher drains:
//! a cursored table scan for rebuilds and a work-queue poll for live
//! indexing. Both retry transient database failures locally with a 1 s
//! backoff and never advance their cursor past work that failed. Rows are
//! decoded through the descriptor's `decode` entry point.

pub mod queue;
pub mod rebuild;

use score_indexer_shared::RecordDescriptor;

pub use queue::{QueueReader, WorkQueue};
pub use rebuild::RebuildReader;

/// Backoff applied after a transient source-database failure.
pub(crate) const TRANSIENT_RETRY: std::time::Duration = std::time::Duration::from_secs(1);

/// SQL for one page of the rebuild scan.
pub(crate) fn scan_query(descriptor: &RecordDescriptor, batch_size: usize) -> String {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} > $1 AND {} <= $2",
        descriptor.select_clause, descriptor.table, descriptor.cursor_column, descriptor.cursor_column
    );
    if let Some(extra) = descriptor.extra_where {
        sql.push_str(" AND ");
        sql.push_str(extra);
    }
    sql.push_str(&format!(
        " ORDER BY {} ASC LIMIT {}",
        descriptor.cursor_column, batch_size
    ));
    sql
}
