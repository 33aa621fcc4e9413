//! Bulk scan into the work queue.
//!
//! Walks every score table in cursor order and queues each id for
//! re-indexing, so a live indexer (typically one building a new schema
//! generation) replays the whole history through its normal queue path.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Settings;
use crate::errors::IndexingError;
use crate::reader::{WorkQueue, TRANSIENT_RETRY};
use score_indexer_repository::CoordinationStore;
use score_indexer_shared::{descriptors, RecordDescriptor};

/// Queues score ids for re-indexing across all rulesets.
pub struct Pump {
    pool: PgPool,
    settings: Settings,
}

impl Pump {
    /// Connect to the source database.
    pub async fn connect(settings: Settings) -> Result<Self, IndexingError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&settings.database_url)
            .await?;
        Ok(Self { pool, settings })
    }

    /// Queue every score past `from`, pacing batches by `delay`. With
    /// `switch`, set the current schema to the configured tag afterwards so
    /// the watchers complete the switchover.
    pub async fn run(
        &self,
        from: Option<i64>,
        switch: bool,
        delay: Option<Duration>,
        coordination: Arc<dyn CoordinationStore>,
    ) -> Result<(), IndexingError> {
        for descriptor in descriptors() {
            self.pump_ruleset(&descriptor, from.unwrap_or(0), delay)
                .await?;
        }

        if switch {
            coordination.set_schema(&self.settings.schema_tag).await?;
            info!(schema = %self.settings.schema_tag, "Set current schema after pump");
        }
        Ok(())
    }

    async fn pump_ruleset(
        &self,
        descriptor: &RecordDescriptor,
        from: i64,
        delay: Option<Duration>,
    ) -> Result<(), IndexingError> {
        let queue = WorkQueue::new(self.pool.clone(), descriptor.ruleset);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} > $1 ORDER BY {} ASC LIMIT {}",
            descriptor.cursor_column,
            descriptor.table,
            descriptor.cursor_column,
            descriptor.cursor_column,
            self.settings.batch_size
        );

        let mut last = from;
        let mut total: u64 = 0;
        loop {
            let ids: Vec<i64> = match sqlx::query(&sql).bind(last).fetch_all(&self.pool).await {
                Ok(rows) => rows
                    .into_iter()
                    .map(|row| row.get(descriptor.cursor_column))
                    .collect(),
                Err(e) => {
                    warn!(table = %descriptor.table, error = %e, "Transient source failure, retrying");
                    sleep(TRANSIENT_RETRY).await;
                    continue;
                }
            };

            let Some(&next) = ids.last() else {
                info!(ruleset = %descriptor.ruleset, total, "Pump complete");
                return Ok(());
            };

            loop {
                match queue.enqueue(&ids).await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(ruleset = %descriptor.ruleset, error = %e, "Failed to enqueue batch, retrying");
                        sleep(TRANSIENT_RETRY).await;
                    }
                }
            }

            total += ids.len() as u64;
            last = next;
            info!(ruleset = %descriptor.ruleset, queued = ids.len(), last, "Queued scores");

            if let Some(delay) = delay {
                sleep(delay).await;
            }
        }
    }
}
