//! Process-wide settings.
//!
//! Resolved once at startup from environment variables (loaded via dotenv)
//! with CLI flags layered on top, into an immutable bundle passed explicitly
//! to every component.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::errors::IndexingError;

/// Default search cluster URL.
const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";

/// Default alias prefix; per-ruleset aliases are `{prefix}_{ruleset}`.
const DEFAULT_ALIAS_PREFIX: &str = "scores";

/// Default mapping file for new physical indices.
const DEFAULT_MAPPING_PATH: &str = "schemas/scores.json";

/// Default number of records per chunk / bulk request.
const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default bounded-channel capacity between reader and dispatcher.
const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Default number of concurrent dispatch workers.
const DEFAULT_MAX_PARALLEL_DISPATCH: usize = 4;

/// Default pause between empty live-queue polls, in milliseconds.
const DEFAULT_READ_DELAY_MS: u64 = 1_000;

/// Immutable configuration bundle.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub search_url: String,
    /// Coordination store connection string; defaults to the source database.
    pub coordination_url: String,
    /// Schema generation this process indexes for.
    pub schema_tag: String,
    pub alias_prefix: String,
    pub mapping_path: PathBuf,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub max_parallel_dispatch: usize,
    pub is_rebuild: bool,
    pub is_new: bool,
    pub is_prep_mode: bool,
    pub resume_from: Option<i64>,
    pub switch_on_complete: bool,
    pub read_delay: Duration,
}

impl Settings {
    /// Resolve settings from the environment with run flags layered on top.
    ///
    /// With `require_schema`, an unset or empty `SCHEMA_VERSION` fails with
    /// [`IndexingError::MissingSchema`]; commands that only touch the
    /// coordination store pass `false`.
    pub fn resolve(args: &RunArgs, require_schema: bool) -> Result<Self, IndexingError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| IndexingError::config("DATABASE_URL is not set"))?;
        let search_url =
            env::var("SEARCH_CLUSTER_URL").unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string());
        let coordination_url =
            env::var("COORDINATION_URL").unwrap_or_else(|_| database_url.clone());
        let schema_tag = env::var("SCHEMA_VERSION").unwrap_or_default();
        let alias_prefix =
            env::var("ALIAS_PREFIX").unwrap_or_else(|_| DEFAULT_ALIAS_PREFIX.to_string());
        let mapping_path = PathBuf::from(
            env::var("MAPPING_PATH").unwrap_or_else(|_| DEFAULT_MAPPING_PATH.to_string()),
        );

        let batch_size = parse_env("BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let queue_capacity = parse_env("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        let max_parallel_dispatch =
            parse_env("MAX_PARALLEL_DISPATCH", DEFAULT_MAX_PARALLEL_DISPATCH)?;
        let read_delay_ms = parse_env("READ_DELAY_MS", DEFAULT_READ_DELAY_MS)?;

        let settings = Self {
            database_url,
            search_url,
            coordination_url,
            schema_tag,
            alias_prefix,
            mapping_path,
            batch_size,
            queue_capacity,
            max_parallel_dispatch,
            is_rebuild: args.rebuild,
            is_new: args.is_new,
            is_prep_mode: args.prep,
            resume_from: args.from,
            switch_on_complete: false,
            read_delay: Duration::from_millis(read_delay_ms),
        };
        settings.validate(require_schema)?;
        Ok(settings)
    }

    fn validate(&self, require_schema: bool) -> Result<(), IndexingError> {
        if require_schema && self.schema_tag.is_empty() {
            return Err(IndexingError::MissingSchema);
        }
        if self.batch_size < 1 {
            return Err(IndexingError::config("BATCH_SIZE must be at least 1"));
        }
        if self.queue_capacity < 1 {
            return Err(IndexingError::config("QUEUE_CAPACITY must be at least 1"));
        }
        if self.max_parallel_dispatch < 1 {
            return Err(IndexingError::config(
                "MAX_PARALLEL_DISPATCH must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, IndexingError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| IndexingError::config(format!("{} is not a valid value", name))),
        Err(_) => Ok(default),
    }
}
