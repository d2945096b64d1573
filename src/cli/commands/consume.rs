use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{
    Enricher, JsonLinesQueue, RateLimiter, Supervisor, SupervisorConfig, create_embedder,
    ensure_collection, stdin_queue,
};
use crate::utils::RetryConfig;

#[derive(Debug, Args)]
pub struct ConsumeArgs {
    #[arg(
        default_value = "-",
        help = "JSON-lines file with one batch per line, or '-' for stdin"
    )]
    pub input: PathBuf,

    #[arg(long, short = 'w', help = "Number of enrichment workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Capacity of the task buffer between dispatch and workers")]
    pub buffer: Option<usize>,

    #[arg(long, help = "Embedding calls per minute across all workers")]
    pub rpm: Option<u32>,

    #[arg(long, help = "Seconds to wait for in-flight batches after shutdown")]
    pub drain_timeout: Option<u64>,
}

pub async fn handle_consume<S>(
    args: ConsumeArgs,
    format: OutputFormat,
    verbose: bool,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send,
{
    let mut config = Config::load()?;
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if let Some(buffer) = args.buffer {
        config.pipeline.buffer_capacity = buffer;
    }
    if let Some(rpm) = args.rpm {
        config.pipeline.requests_per_minute = rpm;
    }
    if args.drain_timeout.is_some() {
        config.pipeline.drain_timeout_secs = args.drain_timeout;
    }
    config.validate()?;

    let formatter = get_formatter(format);

    let embedder =
        create_embedder(&config.embedding).context("failed to create embedding client")?;
    let store = open_store(&config)?;

    let provisioned = ensure_collection(store.as_ref(), &RetryConfig::default())
        .await
        .context("collection provisioning failed")?;

    if verbose {
        eprintln!("Collection: {} ({:?})", store.collection(), provisioned);
        eprintln!(
            "  Embedding: {} (dimension {})",
            embedder.model_name(),
            embedder.dimension()
        );
        eprintln!(
            "  Workers: {}, buffer: {}, rate: {}/min",
            config.pipeline.workers,
            config.pipeline.buffer_capacity,
            config.pipeline.requests_per_minute
        );
    }

    let limiter = Arc::new(RateLimiter::per_minute(config.pipeline.requests_per_minute));
    let enricher = Enricher::new(embedder, store, limiter)
        .with_embed_timeout(config.embedding.timeout());
    let supervisor = Supervisor::new(
        SupervisorConfig::from(&config.pipeline),
        Arc::new(enricher),
    )?;

    let report = if args.input.as_os_str() == "-" {
        let queue = stdin_queue(
            config.pipeline.buffer_capacity,
            config.pipeline.max_message_bytes,
        );
        supervisor.run(queue, shutdown).await?
    } else {
        let queue = JsonLinesQueue::open(&args.input)
            .await
            .with_context(|| format!("failed to open {}", args.input.display()))?
            .with_max_message_bytes(config.pipeline.max_message_bytes);
        supervisor.run(queue, shutdown).await?
    };

    print!("{}", formatter.format_report(&report));
    Ok(())
}
