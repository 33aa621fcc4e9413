//! Cursor-scanned rebuild reader.

use async_channel::Sender;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::IndexingError;
use crate::reader::{scan_query, TRANSIENT_RETRY};
use score_indexer_shared::{Chunk, RecordDescriptor};

/// Reads the whole score table for one ruleset in cursor order, emitting
/// add-set chunks.
pub struct RebuildReader {
    pool: PgPool,
    descriptor: RecordDescriptor,
    batch_size: usize,
}

impl RebuildReader {
    pub fn new(pool: PgPool, descriptor: RecordDescriptor, batch_size: usize) -> Self {
        Self {
            pool,
            descriptor,
            batch_size,
        }
    }

    /// Scan from `start_after` (exclusive) to the table maximum observed at
    /// start, sending chunks into `tx`. Returns when the scan is exhausted
    /// or the channel is closed by the consumer; a shutdown signal surfaces
    /// as [`IndexingError::Cancelled`].
    pub async fn run(
        self,
        start_after: i64,
        tx: Sender<Chunk>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IndexingError> {
        let Some(max) = self.read_max(&mut shutdown).await? else {
            info!(table = %self.descriptor.table, "Source table is empty, nothing to rebuild");
            return Ok(());
        };

        info!(
            table = %self.descriptor.table,
            start_after,
            max,
            "Starting rebuild scan"
        );

        let sql = scan_query(&self.descriptor, self.batch_size);
        let mut last = start_after;

        loop {
            if shutdown.try_recv().is_ok() {
                info!(table = %self.descriptor.table, last, "Rebuild reader stopping on shutdown");
                return Err(IndexingError::Cancelled);
            }

            let rows = match sqlx::query(&sql)
                .bind(last)
                .bind(max)
                .fetch_all(&self.pool)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(table = %self.descriptor.table, error = %e, "Transient source failure, retrying");
                    sleep(TRANSIENT_RETRY).await;
                    continue;
                }
            };

            if rows.is_empty() {
                info!(table = %self.descriptor.table, last, "Rebuild scan complete");
                return Ok(());
            }

            let mut records = Vec::with_capacity(rows.len());
            for row in &rows {
                records.push((self.descriptor.decode)(row)?);
            }

            let Some(chunk) = Chunk::from_adds(records) else {
                continue;
            };
            let next = chunk.last_cursor;

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(table = %self.descriptor.table, last, "Rebuild reader stopping on shutdown");
                    return Err(IndexingError::Cancelled);
                }
                sent = tx.send(chunk) => {
                    if sent.is_err() {
                        // Consumer closed the channel: the run was abandoned.
                        debug!(table = %self.descriptor.table, last, "Chunk channel closed, stopping scan");
                        return Ok(());
                    }
                }
            }

            last = next;
        }
    }

    /// Read the scan upper bound once. `None` for an empty table; transient
    /// failures retry after 1 s without giving up.
    async fn read_max(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Option<i64>, IndexingError> {
        let sql = format!(
            "SELECT {} AS max FROM {}",
            self.descriptor.max_expression, self.descriptor.table
        );
        loop {
            if shutdown.try_recv().is_ok() {
                return Err(IndexingError::Cancelled);
            }
            match sqlx::query(&sql).fetch_one(&self.pool).await {
                Ok(row) => return Ok(row.try_get::<Option<i64>, _>("max")?),
                Err(e) => {
                    warn!(table = %self.descriptor.table, error = %e, "Transient source failure reading max, retrying");
                    sleep(TRANSIENT_RETRY).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tokio::time::timeout;

    use score_indexer_shared::{descriptor, Ruleset};

    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://127.0.0.1:1/unreachable")
            .expect("lazy pool")
    }

    fn reader() -> RebuildReader {
        RebuildReader::new(unreachable_pool(), descriptor(Ruleset::Osu), 100)
    }

    #[tokio::test]
    async fn run_stops_before_scanning_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();
        let (tx, rx) = async_channel::bounded::<Chunk>(4);

        let result = reader().run(0, tx, shutdown_rx).await;

        assert!(matches!(result, Err(IndexingError::Cancelled)));
        // Nothing was emitted before the cancellation.
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn read_max_retries_transient_failures_until_shutdown() {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let reader = reader();
            reader.read_max(&mut shutdown_rx).await
        });

        // Let a few 1 s retry cycles elapse against the unreachable source,
        // then cancel.
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown_tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(60), handle)
            .await
            .expect("read_max did not stop")
            .expect("join error");
        assert!(matches!(result, Err(IndexingError::Cancelled)));
    }
}
