//! Live work-queue reader.
//!
//! Polls the `score_queue` table for pending entries, fetches the matching
//! records, and emits mixed add/delete chunks. A queued id whose record is
//! missing or no longer indexable becomes a delete, so the index converges
//! on the database even for hidden and wiped scores.

use std::time::Duration;

use async_channel::Sender;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::IndexingError;
use crate::reader::TRANSIENT_RETRY;
use score_indexer_shared::{Chunk, RecordDescriptor, Ruleset, ScoreRecord};

/// Queue entry status: pending, waiting to be indexed.
const STATUS_PENDING: i16 = 1;

/// Queue entry status: processed.
const STATUS_COMPLETED: i16 = 2;

/// Access to one ruleset's slice of the shared work-queue table.
#[derive(Clone)]
pub struct WorkQueue {
    pool: PgPool,
    ruleset: Ruleset,
}

impl WorkQueue {
    pub fn new(pool: PgPool, ruleset: Ruleset) -> Self {
        Self { pool, ruleset }
    }

    /// Pending score ids, oldest first, up to `limit`.
    pub async fn pending(&self, limit: usize) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT score_id FROM score_queue WHERE status = $1 AND mode = $2 \
             ORDER BY score_id ASC LIMIT $3",
        )
        .bind(STATUS_PENDING)
        .bind(self.ruleset.mode())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("score_id")).collect())
    }

    /// Mark a batch of queue entries completed.
    pub async fn ack(&self, ids: &[i64]) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE score_queue SET status = $1, updated_at = NOW() \
             WHERE score_id = ANY($2) AND mode = $3",
        )
        .bind(STATUS_COMPLETED)
        .bind(ids)
        .bind(self.ruleset.mode())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-queue every completed entry past `position` so a freshly aliased
    /// index replays the work the old generation consumed.
    pub async fn rewind(&self, position: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE score_queue SET status = $1, updated_at = NOW() \
             WHERE score_id > $2 AND mode = $3",
        )
        .bind(STATUS_PENDING)
        .bind(position)
        .bind(self.ruleset.mode())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Highest completed queue position, or 0 for an untouched queue.
    pub async fn highest_completed(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT MAX(score_id) AS max FROM score_queue WHERE status = $1 AND mode = $2",
        )
        .bind(STATUS_COMPLETED)
        .bind(self.ruleset.mode())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<Option<i64>, _>("max")?.unwrap_or(0))
    }

    /// Queue a batch of score ids for indexing, re-opening entries that were
    /// already completed.
    pub async fn enqueue(&self, ids: &[i64]) -> Result<(), sqlx::Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
            sqlx::QueryBuilder::new("INSERT INTO score_queue (score_id, mode, status) ");
        builder.push_values(ids, |mut row, id| {
            row.push_bind(*id)
                .push_bind(self.ruleset.mode())
                .push_bind(STATUS_PENDING);
        });
        builder.push(" ON CONFLICT (score_id, mode) DO UPDATE SET status = ");
        builder.push_bind(STATUS_PENDING);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

/// Reads pending work-queue entries and emits mixed chunks.
pub struct QueueReader {
    pool: PgPool,
    queue: WorkQueue,
    descriptor: RecordDescriptor,
    batch_size: usize,
    read_delay: Duration,
}

impl QueueReader {
    pub fn new(
        pool: PgPool,
        descriptor: RecordDescriptor,
        batch_size: usize,
        read_delay: Duration,
    ) -> Self {
        let queue = WorkQueue::new(pool.clone(), descriptor.ruleset);
        Self {
            pool,
            queue,
            descriptor,
            batch_size,
            read_delay,
        }
    }

    /// Poll until the consumer closes the channel; a shutdown signal
    /// surfaces as [`IndexingError::Cancelled`].
    pub async fn run(
        self,
        tx: Sender<Chunk>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IndexingError> {
        info!(ruleset = %self.descriptor.ruleset, "Starting live queue reader");

        loop {
            if shutdown.try_recv().is_ok() {
                info!(ruleset = %self.descriptor.ruleset, "Queue reader stopping on shutdown");
                return Err(IndexingError::Cancelled);
            }

            let queued = match self.queue.pending(self.batch_size).await {
                Ok(queued) => queued,
                Err(e) => {
                    warn!(ruleset = %self.descriptor.ruleset, error = %e, "Transient source failure, retrying");
                    sleep(TRANSIENT_RETRY).await;
                    continue;
                }
            };

            if queued.is_empty() {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(ruleset = %self.descriptor.ruleset, "Queue reader stopping on shutdown");
                        return Err(IndexingError::Cancelled);
                    }
                    _ = sleep(self.read_delay) => {}
                }
                continue;
            }

            let chunk = match self.build_chunk(&queued).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.ack_with_retry(&queued).await;
                    continue;
                }
                Err(e) => {
                    warn!(ruleset = %self.descriptor.ruleset, error = %e, "Transient source failure, retrying");
                    sleep(TRANSIENT_RETRY).await;
                    continue;
                }
            };

            debug!(
                ruleset = %self.descriptor.ruleset,
                adds = chunk.adds.len(),
                deletes = chunk.deletes.len(),
                "Emitting live chunk"
            );

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(ruleset = %self.descriptor.ruleset, "Queue reader stopping on shutdown");
                    return Err(IndexingError::Cancelled);
                }
                sent = tx.send(chunk) => {
                    if sent.is_err() {
                        debug!(ruleset = %self.descriptor.ruleset, "Chunk channel closed, stopping reader");
                        return Ok(());
                    }
                }
            }

            // Ack only after the chunk is handed to the dispatcher; a crash
            // before this point leaves the entries pending for replay.
            self.ack_with_retry(&queued).await;
        }
    }

    async fn ack_with_retry(&self, ids: &[i64]) {
        loop {
            match self.queue.ack(ids).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(ruleset = %self.descriptor.ruleset, error = %e, "Failed to ack queue entries, retrying");
                    sleep(TRANSIENT_RETRY).await;
                }
            }
        }
    }

    /// Fetch the records behind a batch of queued ids and split them into
    /// upserts and deletes.
    async fn build_chunk(&self, queued: &[i64]) -> Result<Option<Chunk>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ANY($1)",
            self.descriptor.select_clause, self.descriptor.table, self.descriptor.cursor_column
        );
        let rows = sqlx::query(&sql).bind(queued).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push((self.descriptor.decode)(row)?);
        }

        Ok(split_queued(queued, records))
    }
}

/// Split a batch of queued ids into upserts and deletes: a record that is
/// indexable becomes an add; a queued id whose record is missing or no
/// longer indexable becomes a delete.
fn split_queued(queued: &[i64], records: Vec<ScoreRecord>) -> Option<Chunk> {
    let adds: Vec<ScoreRecord> = records.into_iter().filter(|r| r.should_index()).collect();
    let indexed: std::collections::HashSet<i64> = adds.iter().map(|r| r.id).collect();
    let deletes: Vec<i64> = queued
        .iter()
        .copied()
        .filter(|id| !indexed.contains(id))
        .collect();
    Chunk::new(adds, deletes)
}
