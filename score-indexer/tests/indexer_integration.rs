//! Integration tests for the per-alias indexer.
//!
//! These tests drive the real `Indexer` against a mock search cluster and
//! the in-memory coordination store. The source database pool is lazy and
//! never reachable; the scenarios below exercise initialization and
//! switchover paths that settle before (or without) source reads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use score_indexer::indexer::Indexer;
use score_indexer::{IndexingError, Settings};
use score_indexer_repository::{
    BulkOutcome, CoordinationStore, MemoryCoordinationStore, SearchIndexError, SearchIndexProvider,
};
use score_indexer_shared::{descriptor, IndexMetadata, IndexState, Ruleset, ScoreRecord};

/// Mock search cluster backed by in-memory maps.
struct MockProvider {
    indices: Mutex<std::collections::HashMap<String, IndexMetadata>>,
    alias_targets: Mutex<Vec<String>>,
    alias_commits: Mutex<Vec<String>>,
    closed_indices: Mutex<Vec<String>>,
    bulk_calls: AtomicUsize,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            indices: Mutex::new(std::collections::HashMap::new()),
            alias_targets: Mutex::new(Vec::new()),
            alias_commits: Mutex::new(Vec::new()),
            closed_indices: Mutex::new(Vec::new()),
            bulk_calls: AtomicUsize::new(0),
        }
    }

    fn with_index(self, name: &str, schema: &str, state: IndexState) -> Self {
        let mut meta = IndexMetadata::new(schema);
        meta.state = state;
        self.with_index_meta(name, meta)
    }

    fn with_index_meta(self, name: &str, meta: IndexMetadata) -> Self {
        self.indices.lock().unwrap().insert(name.to_string(), meta);
        self
    }

    fn with_alias(self, target: &str) -> Self {
        self.alias_targets.lock().unwrap().push(target.to_string());
        self
    }

    fn commits(&self) -> Vec<String> {
        self.alias_commits.lock().unwrap().clone()
    }

    fn metadata(&self, index: &str) -> Option<IndexMetadata> {
        self.indices.lock().unwrap().get(index).cloned()
    }
}

#[async_trait]
impl SearchIndexProvider for MockProvider {
    async fn create_index(&self, index: &str) -> Result<(), SearchIndexError> {
        self.indices
            .lock()
            .unwrap()
            .insert(index.to_string(), IndexMetadata::new(""));
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchIndexError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .indices
            .lock()
            .unwrap()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn bulk(
        &self,
        _index: &str,
        _adds: &[ScoreRecord],
        _deletes: &[i64],
    ) -> Result<BulkOutcome, SearchIndexError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BulkOutcome::default())
    }

    async fn get_alias_targets(&self, _alias: &str) -> Result<Vec<String>, SearchIndexError> {
        Ok(self.alias_targets.lock().unwrap().clone())
    }

    async fn update_alias(
        &self,
        _alias: &str,
        new_index: &str,
        close_previous: bool,
    ) -> Result<(), SearchIndexError> {
        let mut targets = self.alias_targets.lock().unwrap();
        if close_previous {
            let mut closed = self.closed_indices.lock().unwrap();
            closed.extend(targets.iter().filter(|t| t.as_str() != new_index).cloned());
        }
        targets.clear();
        targets.push(new_index.to_string());
        self.alias_commits.lock().unwrap().push(new_index.to_string());
        Ok(())
    }

    async fn close_index(&self, index: &str) -> Result<(), SearchIndexError> {
        self.closed_indices.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn get_mapping_meta(
        &self,
        index: &str,
    ) -> Result<Option<IndexMetadata>, SearchIndexError> {
        Ok(self.indices.lock().unwrap().get(index).cloned())
    }

    async fn put_mapping_meta(
        &self,
        index: &str,
        meta: &IndexMetadata,
    ) -> Result<(), SearchIndexError> {
        self.indices
            .lock()
            .unwrap()
            .insert(index.to_string(), meta.clone());
        Ok(())
    }
}

fn settings(schema: &str) -> Settings {
    Settings {
        database_url: "postgres://127.0.0.1:1/unreachable".to_string(),
        search_url: "http://localhost:9200".to_string(),
        coordination_url: "postgres://127.0.0.1:1/unreachable".to_string(),
        schema_tag: schema.to_string(),
        alias_prefix: "scores".to_string(),
        mapping_path: PathBuf::from("schemas/scores.json"),
        batch_size: 100,
        queue_capacity: 4,
        max_parallel_dispatch: 2,
        is_rebuild: false,
        is_new: false,
        is_prep_mode: false,
        resume_from: None,
        switch_on_complete: false,
        read_delay: Duration::from_millis(100),
    }
}

fn rebuild_settings(schema: &str) -> Settings {
    Settings {
        is_rebuild: true,
        ..settings(schema)
    }
}

fn unreachable_pool() -> sqlx::PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy("postgres://127.0.0.1:1/unreachable")
        .expect("lazy pool")
}

fn indexer_with(
    settings: Settings,
    provider: Arc<MockProvider>,
    coordination: Arc<MemoryCoordinationStore>,
) -> Indexer {
    Indexer::new(
        settings,
        descriptor(Ruleset::Osu),
        provider,
        coordination,
        unreachable_pool(),
    )
}

fn indexer(
    schema: &str,
    provider: Arc<MockProvider>,
    coordination: Arc<MemoryCoordinationStore>,
) -> Indexer {
    indexer_with(settings(schema), provider, coordination)
}

#[tokio::test]
async fn version_mismatch_fails_before_any_bulk() {
    let provider = Arc::new(
        MockProvider::new()
            .with_index("scores_osu_20240101000000", "v6", IndexState::Aliased)
            .with_alias("scores_osu_20240101000000"),
    );
    let coordination = Arc::new(MemoryCoordinationStore::new());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let result = indexer("v7", provider.clone(), coordination).run(shutdown_rx).await;

    match result {
        Err(IndexingError::VersionMismatch { expected, actual }) => {
            assert_eq!(expected, "v7");
            assert_eq!(actual, "v6");
        }
        other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
    }
    assert_eq!(provider.bulk_calls.load(Ordering::SeqCst), 0);
    assert!(provider.commits().is_empty());
}

#[tokio::test]
async fn not_ready_without_an_index_at_this_schema() {
    let provider = Arc::new(MockProvider::new());
    let coordination = Arc::new(MemoryCoordinationStore::new());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let result = indexer("v7", provider.clone(), coordination).run(shutdown_rx).await;

    assert!(result.is_ok());
    // Live mode never creates indices.
    assert!(provider.indices.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn live_start_commits_alias_when_unaliased() {
    let provider = Arc::new(MockProvider::new().with_index(
        "scores_osu_20240101000000",
        "v7",
        IndexState::Building,
    ));
    let coordination = Arc::new(MemoryCoordinationStore::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn({
        let provider = provider.clone();
        let coordination = coordination.clone();
        async move { indexer("v7", provider, coordination).run(shutdown_rx).await }
    });

    sleep(Duration::from_secs(1)).await;
    let _ = shutdown_tx.send(());

    timeout(Duration::from_secs(60), handle)
        .await
        .expect("indexer did not stop")
        .expect("join error")
        .expect("indexer failed");

    assert_eq!(provider.commits(), vec!["scores_osu_20240101000000".to_string()]);
    let meta = provider.metadata("scores_osu_20240101000000").unwrap();
    assert_eq!(meta.state, IndexState::Aliased);
    // Being the first indexer anywhere, it bootstrapped the current schema.
    assert_eq!(
        coordination.get_schema().await.unwrap(),
        Some("v7".to_string())
    );
}

#[tokio::test]
async fn rebuild_creates_index_at_configured_schema() {
    let provider = Arc::new(MockProvider::new());
    let coordination = Arc::new(MemoryCoordinationStore::new());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // The fresh index is cut before the source is touched; the unreachable
    // database then fails the queue-position capture and surfaces as a
    // source error, with no alias commit.
    let result = indexer_with(rebuild_settings("v8"), provider.clone(), coordination)
        .run(shutdown_rx)
        .await;

    assert!(matches!(result, Err(IndexingError::Source(_))));
    let indices = provider.indices.lock().unwrap();
    assert_eq!(indices.len(), 1);
    let (name, meta) = indices.iter().next().unwrap();
    assert!(name.starts_with("scores_osu_"));
    assert_eq!(meta.schema, "v8");
    assert_eq!(meta.state, IndexState::Building);
    drop(indices);
    assert!(provider.commits().is_empty());
    assert_eq!(provider.bulk_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupted_rebuild_does_not_commit_alias() {
    let mut resumed = IndexMetadata::new("v8");
    resumed.last_id = 12_000;
    resumed.reset_queue_to = Some(500);
    let provider = Arc::new(
        MockProvider::new().with_index_meta("scores_osu_20240501000000", resumed),
    );
    let coordination = Arc::new(MemoryCoordinationStore::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn({
        let provider = provider.clone();
        let coordination = coordination.clone();
        async move {
            indexer_with(rebuild_settings("v8"), provider, coordination)
                .run(shutdown_rx)
                .await
        }
    });

    // The scan retries against the unreachable source; cancel mid-rebuild.
    sleep(Duration::from_secs(2)).await;
    let _ = shutdown_tx.send(());

    timeout(Duration::from_secs(60), handle)
        .await
        .expect("indexer did not stop")
        .expect("join error")
        .expect("indexer failed");

    // An interrupted rebuild never commits and keeps its checkpoint.
    assert!(provider.commits().is_empty());
    let meta = provider.metadata("scores_osu_20240501000000").unwrap();
    assert_eq!(meta.state, IndexState::Building);
    assert_eq!(meta.last_id, 12_000);
    assert_eq!(meta.reset_queue_to, Some(500));
    assert_eq!(
        coordination.get_schema().await.unwrap(),
        Some("v8".to_string())
    );
    assert!(coordination.active().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn standby_commits_alias_when_schema_flips() {
    let provider = Arc::new(
        MockProvider::new()
            .with_index("scores_osu_20240101000000", "v7", IndexState::Aliased)
            .with_index("scores_osu_20240301000000", "v8", IndexState::Ready)
            .with_alias("scores_osu_20240101000000"),
    );
    let coordination = Arc::new(MemoryCoordinationStore::new());
    coordination.set_schema("v7").await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn({
        let provider = provider.clone();
        let coordination = coordination.clone();
        async move { indexer("v8", provider, coordination).run(shutdown_rx).await }
    });

    // Let the watcher take its first reading, then flip the schema.
    sleep(Duration::from_secs(3)).await;
    assert!(provider.commits().is_empty());
    coordination.set_schema("v8").await.unwrap();

    // The next 5 s tick commits the alias.
    sleep(Duration::from_secs(7)).await;
    let _ = shutdown_tx.send(());

    timeout(Duration::from_secs(60), handle)
        .await
        .expect("indexer did not stop")
        .expect("join error")
        .expect("indexer failed");

    assert_eq!(provider.commits(), vec!["scores_osu_20240301000000".to_string()]);
    // The old generation's index was closed by the commit.
    assert!(provider
        .closed_indices
        .lock()
        .unwrap()
        .contains(&"scores_osu_20240101000000".to_string()));
    let meta = provider.metadata("scores_osu_20240301000000").unwrap();
    assert_eq!(meta.state, IndexState::Aliased);
}

#[tokio::test(start_paused = true)]
async fn indexer_steps_down_when_schema_moves_elsewhere() {
    let provider = Arc::new(
        MockProvider::new()
            .with_index("scores_osu_20240101000000", "v7", IndexState::Aliased)
            .with_alias("scores_osu_20240101000000"),
    );
    let coordination = Arc::new(MemoryCoordinationStore::new());
    coordination.set_schema("v7").await.unwrap();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn({
        let provider = provider.clone();
        let coordination = coordination.clone();
        async move { indexer("v7", provider, coordination).run(shutdown_rx).await }
    });

    sleep(Duration::from_secs(3)).await;
    coordination.set_schema("v8").await.unwrap();

    // The indexer stops by itself within one watcher tick.
    timeout(Duration::from_secs(60), handle)
        .await
        .expect("indexer did not step down")
        .expect("join error")
        .expect("indexer failed");

    assert!(provider.commits().is_empty());
    assert!(coordination.active().await.unwrap().is_empty());
}
