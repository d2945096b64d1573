//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Enrich bibliographic records with embeddings and store them in Qdrant.
#[derive(Debug, Parser)]
#[command(name = "scholar-ingest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the enrichment pipeline over a stream of record batches
    Consume(commands::ConsumeArgs),

    /// Create the vector collection if it does not exist
    Provision,

    /// Semantic search over stored records
    Search(commands::SearchArgs),

    /// Show one stored record by its identifier
    Show(commands::ShowArgs),

    /// Show a random sample of stored records
    List(commands::ListArgs),

    /// Explain a passage and find related papers
    Explain(commands::ExplainArgs),

    /// Check infrastructure status (embedding provider, Qdrant)
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
