//! Score Indexer Main Entry Point
//!
//! Projects scores from the relational source of truth into the search
//! cluster: live from the work queue, or as a bulk rebuild of a new schema
//! generation.

use std::env;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use score_indexer::cli::{Cli, Command, PumpTarget, RunArgs, SchemaAction};
use score_indexer::pump::Pump;
use score_indexer::scheduler::Scheduler;
use score_indexer::{Dependencies, IndexingError, Settings};

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("score_indexer=info,score_indexer_repository=info"));

    if env::var("LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();
    }

    info!(
        service_name = "score-indexer",
        service_version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let settings = Settings::resolve(&args, true)?;
            let deps = match Dependencies::new(settings).await {
                Ok(deps) => deps,
                Err(e) => {
                    error!(error = %e, "Failed to initialize dependencies");
                    return Err(e);
                }
            };
            Scheduler::new(deps).run().await
        }
        Command::Pump {
            target: PumpTarget::All { from, switch, delay },
        } => {
            let settings = Settings::resolve(&RunArgs::default(), true)?;
            let coordination = Dependencies::coordination_only(&settings).await?;
            let pump = Pump::connect(settings).await?;
            pump.run(from, switch, delay.map(Duration::from_millis), coordination)
                .await
        }
        Command::Schema { action } => {
            let settings = Settings::resolve(&RunArgs::default(), false)?;
            let coordination = Dependencies::coordination_only(&settings).await?;
            match action {
                SchemaAction::Get => {
                    let current = coordination.get_schema().await?;
                    println!("{}", current.as_deref().unwrap_or("(none)"));
                }
                SchemaAction::Set { schema } => {
                    coordination.set_schema(&schema).await?;
                    info!(schema = %schema, "Current schema set");
                }
                SchemaAction::Clear => {
                    coordination.clear_schema().await?;
                    info!("Current schema cleared");
                }
            }
            Ok(())
        }
    }
}
