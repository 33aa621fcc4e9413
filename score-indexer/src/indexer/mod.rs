//! Per-alias indexer orchestration.
//!
//! One indexer owns one physical index for the duration of a run: it
//! resolves the target index, wires the reader to the dispatcher through a
//! bounded channel, watches the coordination store for schema changes, and
//! commits or abandons the alias at the end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::dispatcher::{BulkDispatcher, DispatcherConfig, MetaEvent, MetadataWriter};
use crate::errors::IndexingError;
use crate::reader::{QueueReader, RebuildReader, WorkQueue};
use score_indexer_repository::{
    CoordinationStore, IndexManager, MetadataStore, SearchIndexProvider,
};
use score_indexer_shared::{IndexMetadata, IndexState, RecordDescriptor};

/// Interval between coordination-store schema checks.
const SCHEMA_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the metadata completion channel.
const META_CHANNEL_CAPACITY: usize = 64;

/// Per-alias top-level orchestrator.
pub struct Indexer {
    settings: Settings,
    descriptor: RecordDescriptor,
    provider: Arc<dyn SearchIndexProvider>,
    coordination: Arc<dyn CoordinationStore>,
    pool: PgPool,
}

impl Indexer {
    pub fn new(
        settings: Settings,
        descriptor: RecordDescriptor,
        provider: Arc<dyn SearchIndexProvider>,
        coordination: Arc<dyn CoordinationStore>,
        pool: PgPool,
    ) -> Self {
        Self {
            settings,
            descriptor,
            provider,
            coordination,
            pool,
        }
    }

    /// Run one indexing pass for this alias. Live mode runs until a stop is
    /// requested; rebuild mode runs to scan completion and then commits (or
    /// parks at ready in prep mode). An index closed under us surfaces as
    /// [`IndexingError::IndexClosed`], which the scheduler treats as
    /// restartable rather than fatal.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), IndexingError> {
        let alias = self.descriptor.alias(&self.settings.alias_prefix);
        let metadata_store = MetadataStore::new(Arc::clone(&self.provider));
        let queue = WorkQueue::new(self.pool.clone(), self.descriptor.ruleset);

        let Some((index, meta)) = self.initialize(&alias, &metadata_store, &queue).await? else {
            return Ok(());
        };

        info!(
            alias = %alias,
            index = %index,
            schema = %self.settings.schema_tag,
            last_id = meta.last_id,
            rebuild = self.settings.is_rebuild,
            "Indexer starting"
        );

        self.coordination.add_active(&index).await?;
        if self.coordination.get_schema().await?.is_none() {
            // First indexer anywhere at any schema: bootstrap the key.
            self.coordination
                .set_schema(&self.settings.schema_tag)
                .await?;
            info!(schema = %self.settings.schema_tag, "Bootstrapped current schema");
        }

        // Local stop fans out to the reader; the global shutdown and the
        // schema watcher both feed it.
        let (stop_tx, _) = broadcast::channel(1);

        let (chunk_tx, chunk_rx) = async_channel::bounded(self.settings.queue_capacity);
        let (meta_tx, meta_rx) = mpsc::channel(META_CHANNEL_CAPACITY);
        let writer = MetadataWriter::spawn(
            metadata_store.clone(),
            index.clone(),
            meta.clone(),
            meta_rx,
        );

        let reader_handle = {
            let stop_rx = stop_tx.subscribe();
            if self.settings.is_rebuild {
                let reader = RebuildReader::new(
                    self.pool.clone(),
                    self.descriptor,
                    self.settings.batch_size,
                );
                let start_after = meta.last_id;
                tokio::spawn(async move { reader.run(start_after, chunk_tx, stop_rx).await })
            } else {
                let reader = QueueReader::new(
                    self.pool.clone(),
                    self.descriptor,
                    self.settings.batch_size,
                    self.settings.read_delay,
                );
                tokio::spawn(async move { reader.run(chunk_tx, stop_rx).await })
            }
        };

        let progress = Arc::new(AtomicU64::new(0));
        let dispatcher = BulkDispatcher::new(
            Arc::clone(&self.provider),
            index.clone(),
            DispatcherConfig {
                queue_capacity: self.settings.queue_capacity,
                max_parallel_dispatch: self.settings.max_parallel_dispatch,
            },
            Arc::clone(&progress),
        );
        let dispatch_meta_tx = meta_tx.clone();
        let mut dispatcher_handle =
            tokio::spawn(async move { dispatcher.run(chunk_rx, dispatch_meta_tx).await });

        let mut watcher = interval(SCHEMA_WATCH_INTERVAL);
        watcher.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut previous: Option<String> = None;
        let mut stopping = false;
        let mut last_progress = 0u64;

        let outcome = loop {
            tokio::select! {
                outcome = &mut dispatcher_handle => break outcome,
                _ = shutdown.recv(), if !stopping => {
                    info!(alias = %alias, "Shutdown received, stopping indexer");
                    stopping = true;
                    let _ = stop_tx.send(());
                }
                _ = watcher.tick() => {
                    let chunks = progress.load(Ordering::Relaxed);
                    if chunks != last_progress {
                        info!(alias = %alias, chunks_dispatched = chunks, "Indexing progress");
                        last_progress = chunks;
                    }
                    self.watch_schema(&alias, &index, &meta_tx, &stop_tx, &mut previous, &mut stopping).await;
                }
            }
        };

        // The dispatcher is done; make sure the reader is not left behind on
        // an error path where nothing closed its channel.
        let _ = stop_tx.send(());

        let outcome = outcome
            .map_err(|e| IndexingError::channel(format!("dispatcher task failed: {e}")))??;
        let reader_result = reader_handle
            .await
            .map_err(|e| IndexingError::channel(format!("reader task failed: {e}")))?;

        drop(meta_tx);
        let mut final_meta = writer
            .await
            .map_err(|e| IndexingError::channel(format!("metadata writer failed: {e}")))?;

        match reader_result {
            Ok(()) => {}
            Err(IndexingError::Cancelled) => {
                info!(alias = %alias, index = %index, "Reader cancelled");
            }
            Err(e) => {
                let _ = self.coordination.remove_active(&index).await;
                return Err(e);
            }
        }

        if outcome.index_closed {
            warn!(alias = %alias, index = %index, "Run abandoned after index-closed signal");
            let _ = self.coordination.remove_active(&index).await;
            return Err(IndexingError::IndexClosed(index));
        }

        if self.settings.is_rebuild && !stopping {
            self.complete_rebuild(&alias, &index, &metadata_store, &mut final_meta)
                .await?;
        }

        self.coordination.remove_active(&index).await?;
        info!(
            alias = %alias,
            index = %index,
            chunks = outcome.chunks_dispatched,
            last_id = final_meta.last_id,
            "Indexer finished"
        );
        Ok(())
    }

    /// Resolve the target index and prepare its metadata.
    ///
    /// Returns `None` when this alias is not ready to run (live mode with no
    /// index built at the configured schema).
    async fn initialize(
        &self,
        alias: &str,
        metadata_store: &MetadataStore,
        queue: &WorkQueue,
    ) -> Result<Option<(String, IndexMetadata)>, IndexingError> {
        let manager =
            IndexManager::new(Arc::clone(&self.provider), self.settings.schema_tag.as_str());

        let (index, mut meta, aliased) = if self.settings.is_rebuild {
            let found = manager
                .find_or_create(alias, self.settings.is_new)
                .await?;
            (found.index, found.metadata, found.aliased)
        } else {
            match manager.find(alias).await? {
                Some(found) => {
                    if found.metadata.schema != self.settings.schema_tag {
                        return Err(IndexingError::version_mismatch(
                            &self.settings.schema_tag,
                            &found.metadata.schema,
                        ));
                    }
                    (found.index, found.metadata, found.aliased)
                }
                None => {
                    // Nothing built at our schema. An alias held by another
                    // generation is a configuration error; an absent alias
                    // just means we are not ready yet.
                    let targets = self.provider.get_alias_targets(alias).await?;
                    if let Some(target) = targets.first() {
                        let Some(other) = metadata_store.load(target).await? else {
                            return Err(IndexingError::MissingSchema);
                        };
                        if other.schema.is_empty() {
                            return Err(IndexingError::MissingSchema);
                        }
                        return Err(IndexingError::version_mismatch(
                            &self.settings.schema_tag,
                            &other.schema,
                        ));
                    }
                    info!(
                        alias = %alias,
                        schema = %self.settings.schema_tag,
                        "Alias has never been built at this schema; indexer not ready"
                    );
                    return Ok(None);
                }
            }
        };

        if let Some(resume) = self.settings.resume_from {
            meta.observe_cursor(resume);
        }

        if self.settings.is_rebuild && meta.reset_queue_to.is_none() {
            // Remember where the live queue stood so the next live run can
            // rewind and replay everything consumed since the scan began.
            let position = queue.highest_completed().await?;
            meta.reset_queue_to = Some(position);
            info!(alias = %alias, position, "Captured queue rewind position");
        }

        if !self.settings.is_rebuild {
            if !aliased {
                let current = self.coordination.get_schema().await?;
                if current.as_deref().map_or(true, |c| c == self.settings.schema_tag) {
                    // We are the single current live indexer: take the alias
                    // before consuming the queue.
                    self.provider.update_alias(alias, &index, true).await?;
                    meta.transition(IndexState::Aliased);
                    info!(alias = %alias, index = %index, "Committed alias on startup");
                } else {
                    // Another generation holds the alias; build in the
                    // background until the schema watcher sees the flip.
                    info!(
                        alias = %alias,
                        index = %index,
                        current = current.as_deref().unwrap_or_default(),
                        "Standing by; alias held by the current schema"
                    );
                }
            }
            if let Some(position) = meta.reset_queue_to.take() {
                let requeued = queue.rewind(position).await?;
                info!(alias = %alias, position, requeued, "Rewound work queue");
            }
        }

        metadata_store.save(&index, &meta).await?;
        Ok(Some((index, meta)))
    }

    /// One schema-watcher tick: compare the current schema against the
    /// remembered one and either commit the alias or step down.
    async fn watch_schema(
        &self,
        alias: &str,
        index: &str,
        meta_tx: &mpsc::Sender<MetaEvent>,
        stop_tx: &broadcast::Sender<()>,
        previous: &mut Option<String>,
        stopping: &mut bool,
    ) {
        let current = match self.coordination.get_schema().await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!(alias = %alias, error = %e, "Failed to read current schema");
                return;
            }
        };

        let Some(prev) = previous.clone() else {
            // First reading establishes the baseline.
            *previous = Some(current);
            return;
        };
        if prev == current {
            return;
        }

        if current == self.settings.schema_tag {
            info!(alias = %alias, index = %index, schema = %current, "Schema became current; committing alias");
            match self.provider.update_alias(alias, index, true).await {
                Ok(()) => {
                    let _ = meta_tx.send(MetaEvent::Transition(IndexState::Aliased)).await;
                    *previous = Some(current);
                }
                Err(e) => {
                    // previous stays unchanged so the next tick retries.
                    error!(alias = %alias, index = %index, error = %e, "Alias commit failed");
                }
            }
        } else {
            info!(
                alias = %alias,
                index = %index,
                current = %current,
                ours = %self.settings.schema_tag,
                "Current schema moved elsewhere; stepping down"
            );
            if let Err(e) = self.coordination.remove_active(index).await {
                warn!(index = %index, error = %e, "Failed to deregister active schema");
            }
            *previous = Some(current);
            if !*stopping {
                *stopping = true;
                let _ = stop_tx.send(());
            }
        }
    }

    /// Rebuild completion: park at ready in prep mode, otherwise commit.
    async fn complete_rebuild(
        &self,
        alias: &str,
        index: &str,
        metadata_store: &MetadataStore,
        meta: &mut IndexMetadata,
    ) -> Result<(), IndexingError> {
        if self.settings.is_prep_mode {
            meta.transition(IndexState::Ready);
            metadata_store.save(index, meta).await?;
            info!(alias = %alias, index = %index, "Rebuild complete; waiting for external switch");
        } else {
            self.provider.update_alias(alias, index, true).await?;
            meta.transition(IndexState::Aliased);
            metadata_store.save(index, meta).await?;
            info!(alias = %alias, index = %index, "Rebuild complete; alias committed");
        }
        Ok(())
    }
}
