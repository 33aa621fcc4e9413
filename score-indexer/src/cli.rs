//! Command-line surface for the indexer binary.

use clap::{Args, Parser, Subcommand};

/// Score search indexer.
#[derive(Debug, Parser)]
#[command(name = "score-indexer", version, about = "Projects scores into the search cluster")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the indexer loop (one indexer per ruleset alias).
    Run(RunArgs),

    /// Bulk-scan score ids into the work queue.
    Pump {
        #[command(subcommand)]
        target: PumpTarget,
    },

    /// Read or write the current schema in the coordination store.
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Rebuild from a cursored table scan instead of the live work queue.
    #[arg(long)]
    pub rebuild: bool,

    /// Always cut a fresh physical index instead of resuming one.
    #[arg(long = "new")]
    pub is_new: bool,

    /// Stop at the ready state instead of committing the alias (rebuild).
    #[arg(long)]
    pub prep: bool,

    /// Resume the scan from this cursor value.
    #[arg(long)]
    pub from: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub enum PumpTarget {
    /// Queue every score for re-indexing.
    All {
        /// Start the scan after this score id.
        #[arg(long)]
        from: Option<i64>,

        /// Set the current schema to the configured tag once the pump
        /// completes, triggering the switchover.
        #[arg(long)]
        switch: bool,

        /// Pause between scan batches, in milliseconds.
        #[arg(long)]
        delay: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SchemaAction {
    /// Print the current schema.
    Get,
    /// Set the current schema.
    Set { schema: String },
    /// Clear the current schema.
    Clear,
}
