//! Bulk dispatch worker pool.
//!
//! Consumes chunks from the reader channel and ships them to the search
//! cluster, preferring the retry channel over fresh input so rejected work
//! preempts forward progress. A single shared delay level throttles all
//! workers when the cluster pushes back; a dedicated writer task serializes
//! metadata updates so the checkpoint stays monotonic across workers.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::errors::IndexingError;
use score_indexer_repository::{MetadataStore, SearchIndexProvider};
use score_indexer_shared::{Chunk, IndexMetadata, IndexState};

/// Ceiling on the shared delay level.
const MAX_DELAY: u32 = 30;

/// Milliseconds slept per delay level before each dispatch.
const DELAY_STEP_MS: u64 = 100;

/// Poll interval while waiting for in-flight retries during drain.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Events consumed by the serialized metadata writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaEvent {
    /// A chunk with this high-water cursor was dispatched successfully.
    BatchCompleted(i64),
    /// Move the index to a new lifecycle state.
    Transition(IndexState),
}

/// Serialized writer of index metadata.
///
/// The single consumer of [`MetaEvent`]s; folding completions through one
/// task keeps `last_id` monotonically non-decreasing no matter how bulk
/// requests interleave across workers.
pub struct MetadataWriter;

impl MetadataWriter {
    /// Spawn the writer task. It persists after every event and returns the
    /// final metadata when the channel closes.
    pub fn spawn(
        store: MetadataStore,
        index: String,
        mut meta: IndexMetadata,
        mut rx: mpsc::Receiver<MetaEvent>,
    ) -> JoinHandle<IndexMetadata> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    MetaEvent::BatchCompleted(cursor) => meta.observe_cursor(cursor),
                    MetaEvent::Transition(state) => {
                        if !meta.transition(state) {
                            warn!(index = %index, from = %meta.state, to = %state, "Ignoring backwards state transition");
                            continue;
                        }
                    }
                }
                if let Err(e) = store.save(&index, &meta).await {
                    // The next event retries the write; last_id only moves
                    // forward so a lost intermediate save costs nothing.
                    warn!(index = %index, error = %e, "Failed to persist metadata");
                }
            }
            if let Err(e) = store.save(&index, &meta).await {
                warn!(index = %index, error = %e, "Failed to persist final metadata");
            }
            meta
        })
    }
}

/// Configuration for the dispatch worker pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub max_parallel_dispatch: usize,
}

/// Result of a dispatcher run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOutcome {
    /// The cluster closed the index mid-run; the run is abandoned and no
    /// alias commit may happen.
    pub index_closed: bool,
    /// Chunks successfully dispatched.
    pub chunks_dispatched: u64,
}

/// Dispatches chunks to one physical index with retry and throttling.
pub struct BulkDispatcher {
    provider: Arc<dyn SearchIndexProvider>,
    index: String,
    config: DispatcherConfig,
    /// Chunks dispatched so far, shared with the indexer's progress logging.
    dispatched: Arc<AtomicU64>,
}

impl BulkDispatcher {
    pub fn new(
        provider: Arc<dyn SearchIndexProvider>,
        index: impl Into<String>,
        config: DispatcherConfig,
        dispatched: Arc<AtomicU64>,
    ) -> Self {
        Self {
            provider,
            index: index.into(),
            config,
            dispatched,
        }
    }

    /// Drain `rx` through the worker pool, reporting completions to
    /// `meta_tx`. Returns once the channel is closed and every retry has
    /// settled, or immediately after an index-closed signal.
    pub async fn run(
        &self,
        rx: Receiver<Chunk>,
        meta_tx: mpsc::Sender<MetaEvent>,
    ) -> Result<DispatchOutcome, IndexingError> {
        let (retry_tx, retry_rx) = async_channel::bounded(self.config.queue_capacity);
        let delay = Arc::new(AtomicU32::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(self.config.max_parallel_dispatch);
        for worker_id in 0..self.config.max_parallel_dispatch {
            let worker = DispatchWorker {
                worker_id,
                provider: Arc::clone(&self.provider),
                index: self.index.clone(),
                rx: rx.clone(),
                retry_rx: retry_rx.clone(),
                retry_tx: retry_tx.clone(),
                meta_tx: meta_tx.clone(),
                delay: Arc::clone(&delay),
                closed: Arc::clone(&closed),
                in_flight: Arc::clone(&in_flight),
                dispatched: Arc::clone(&self.dispatched),
            };
            workers.push(tokio::spawn(worker.run()));
        }

        let mut result = Ok(());
        for worker in workers {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) => {
                    if result.is_ok() {
                        result = Err(IndexingError::channel(format!("worker panicked: {e}")));
                    }
                }
            }
        }
        result?;

        let outcome = DispatchOutcome {
            index_closed: closed.load(Ordering::SeqCst),
            chunks_dispatched: self.dispatched.load(Ordering::SeqCst),
        };
        info!(
            index = %self.index,
            chunks = outcome.chunks_dispatched,
            index_closed = outcome.index_closed,
            "Dispatcher drained"
        );
        Ok(outcome)
    }
}

/// One dispatch worker.
struct DispatchWorker {
    worker_id: usize,
    provider: Arc<dyn SearchIndexProvider>,
    index: String,
    rx: Receiver<Chunk>,
    retry_rx: Receiver<Chunk>,
    retry_tx: Sender<Chunk>,
    meta_tx: mpsc::Sender<MetaEvent>,
    delay: Arc<AtomicU32>,
    closed: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    dispatched: Arc<AtomicU64>,
}

impl DispatchWorker {
    async fn run(self) -> Result<(), IndexingError> {
        debug!(worker = self.worker_id, index = %self.index, "Dispatch worker started");
        loop {
            let Some(chunk) = self.next_chunk().await else {
                break;
            };
            let result = self.dispatch(chunk).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result?;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
        }
        debug!(worker = self.worker_id, index = %self.index, "Dispatch worker exiting");
        Ok(())
    }

    /// Take the next chunk, preferring retries over fresh input. Returns
    /// `None` once the input is closed and no retry work remains, or after
    /// an index-closed signal.
    async fn next_chunk(&self) -> Option<Chunk> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Ok(chunk) = self.retry_rx.try_recv() {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                return Some(chunk);
            }
            tokio::select! {
                biased;
                retry = self.retry_rx.recv() => {
                    if let Ok(chunk) = retry {
                        self.in_flight.fetch_add(1, Ordering::SeqCst);
                        return Some(chunk);
                    }
                }
                fresh = self.rx.recv() => {
                    match fresh {
                        Ok(chunk) => {
                            self.in_flight.fetch_add(1, Ordering::SeqCst);
                            return Some(chunk);
                        }
                        Err(_) => {
                            // Input drained; wait out chunks other workers
                            // may still requeue.
                            if self.in_flight.load(Ordering::SeqCst) == 0
                                && self.retry_rx.is_empty()
                            {
                                return None;
                            }
                            sleep(DRAIN_POLL).await;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, chunk: Chunk) -> Result<(), IndexingError> {
        let level = self.delay.load(Ordering::SeqCst);
        if level > 0 {
            sleep(Duration::from_millis(u64::from(level) * DELAY_STEP_MS)).await;
        }

        match self
            .provider
            .bulk(&self.index, &chunk.adds, &chunk.deletes)
            .await
        {
            Err(e) => {
                warn!(
                    worker = self.worker_id,
                    index = %self.index,
                    error = %e,
                    "Bulk request failed, requeueing chunk"
                );
                bump(&self.delay);
                self.requeue(chunk).await
            }
            Ok(outcome) if outcome.index_closed => {
                warn!(worker = self.worker_id, index = %self.index, "Index closed, abandoning run");
                self.closed.store(true, Ordering::SeqCst);
                // Stops the reader: its next send fails and it exits.
                self.rx.close();
                Ok(())
            }
            Ok(outcome) if outcome.needs_retry() => {
                bump(&self.delay);
                debug!(
                    worker = self.worker_id,
                    index = %self.index,
                    rejected = outcome.rejected,
                    delay = self.delay.load(Ordering::SeqCst),
                    "Bulk rejected, requeueing chunk"
                );
                self.requeue(chunk).await
            }
            Ok(outcome) => {
                for item in &outcome.item_errors {
                    // TODO: forward failed items to the notification queue.
                    error!(
                        index = %self.index,
                        id = %item.id,
                        status = item.status,
                        error_type = %item.error_type,
                        reason = %item.reason,
                        "Bulk item failed; not retried"
                    );
                }
                relax(&self.delay);
                self.dispatched.fetch_add(1, Ordering::SeqCst);
                self.meta_tx
                    .send(MetaEvent::BatchCompleted(chunk.last_cursor))
                    .await
                    .map_err(|_| IndexingError::channel("metadata writer stopped"))
            }
        }
    }

    async fn requeue(&self, chunk: Chunk) -> Result<(), IndexingError> {
        self.retry_tx
            .send(chunk)
            .await
            .map_err(|_| IndexingError::channel("retry channel closed"))
    }
}

/// Raise the delay level, saturating at the ceiling.
fn bump(delay: &AtomicU32) {
    let _ = delay.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
        (level < MAX_DELAY).then_some(level + 1)
    });
}

/// Lower the delay level, bounded at zero.
fn relax(delay: &AtomicU32) {
    let _ = delay.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
        level.checked_sub(1)
    });
}
