//! Top-level scheduler.
//!
//! Starts one indexer per configured ruleset alias and roots the
//! cancellation tree: ctrl-c fans out through a broadcast channel, the
//! indexers drain, and the first failure (if any) becomes the exit status.

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Dependencies;
use crate::errors::IndexingError;
use crate::indexer::Indexer;
use score_indexer_shared::descriptors;

/// Supervises one indexer per ruleset alias.
pub struct Scheduler {
    deps: Dependencies,
}

impl Scheduler {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    /// Run all indexers to completion, forwarding ctrl-c as cancellation.
    pub async fn run(&self) -> Result<(), IndexingError> {
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut handles = Vec::new();
        for descriptor in descriptors() {
            let indexer = Indexer::new(
                self.deps.settings.clone(),
                descriptor,
                self.deps.provider.clone(),
                self.deps.coordination.clone(),
                self.deps.pool.clone(),
            );
            let shutdown = shutdown_tx.subscribe();
            info!(ruleset = %descriptor.ruleset, "Starting indexer");
            handles.push(tokio::spawn(async move { indexer.run(shutdown).await }));
        }

        let join_all = futures::future::join_all(handles);
        tokio::pin!(join_all);

        let results = tokio::select! {
            results = &mut join_all => results,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                join_all.await
            }
        };

        let mut first_error = None;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(IndexingError::IndexClosed(index))) => {
                    // Not fatal: the run was abandoned without an alias
                    // commit and a fresh start resumes from the checkpoint.
                    warn!(index = %index, "Indexer abandoned a closed index; restart to resume");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Indexer failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Indexer task panicked");
                    first_error
                        .get_or_insert_with(|| IndexingError::channel(format!("indexer task: {e}")));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Scheduler shutdown complete");
                Ok(())
            }
        }
    }
}
