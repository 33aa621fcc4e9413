//! Dependency initialization and wiring for the indexer.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Settings;
use crate::errors::IndexingError;
use score_indexer_repository::{
    CoordinationStore, OpenSearchProvider, PostgresCoordinationStore, SearchIndexProvider,
};

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Connection mode for the search cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse connection mode from `SEARCH_CONNECTION_MODE`.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn from_env() -> Self {
        match env::var("SEARCH_CONNECTION_MODE")
            .unwrap_or_else(|_| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid SEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub settings: Settings,
    pub provider: Arc<dyn SearchIndexProvider>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub pool: sqlx::PgPool,
}

impl Dependencies {
    /// Initialize all dependencies from the resolved settings.
    pub async fn new(settings: Settings) -> Result<Self, IndexingError> {
        let mode = ConnectionMode::from_env();
        let retry_interval = env::var("SEARCH_RETRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);

        info!(
            search_url = %settings.search_url,
            alias_prefix = %settings.alias_prefix,
            schema = %settings.schema_tag,
            connection_mode = ?mode,
            "Initializing dependencies"
        );

        let provider = Self::connect_to_search(
            &settings,
            mode,
            Duration::from_secs(retry_interval),
        )
        .await?;
        info!("Search cluster connection established");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&settings.database_url)
            .await?;

        let coordination: Arc<dyn CoordinationStore> = if settings.coordination_url
            == settings.database_url
        {
            Arc::new(PostgresCoordinationStore::new(pool.clone()))
        } else {
            let coordination_pool = PgPoolOptions::new()
                .max_connections(4)
                .connect(&settings.coordination_url)
                .await?;
            Arc::new(PostgresCoordinationStore::new(coordination_pool))
        };

        Ok(Self {
            settings,
            provider: Arc::new(provider),
            coordination,
            pool,
        })
    }

    /// Initialize only the coordination store, for schema commands that never
    /// touch the search cluster or the source tables.
    pub async fn coordination_only(
        settings: &Settings,
    ) -> Result<Arc<dyn CoordinationStore>, IndexingError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&settings.coordination_url)
            .await?;
        Ok(Arc::new(PostgresCoordinationStore::new(pool)))
    }

    /// Connect to the search cluster with retry logic based on connection mode.
    async fn connect_to_search(
        settings: &Settings,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match OpenSearchProvider::new(&settings.search_url, &settings.mapping_path).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to search cluster: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            search_url = %settings.search_url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to search cluster, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
