use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::time::Instant;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, SearchResults};
use crate::services::{KeywordRanker, create_embedder, rerank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RerankStrategy {
    /// Title, abstract and category substring matching
    Keyword,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<u32>,

    #[arg(long, help = "Minimum similarity score threshold (0.0-1.0)")]
    pub min_score: Option<f32>,

    #[arg(long, value_enum, help = "Re-rank vector results with another strategy")]
    pub rerank: Option<RerankStrategy>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = args.limit.unwrap_or(config.search.default_limit);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    if let Some(score) = args.min_score
        && !(0.0..=1.0).contains(&score)
    {
        anyhow::bail!("min_score must be between 0.0 and 1.0");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {limit}");
        if let Some(score) = args.min_score {
            eprintln!("  Min score: {score:.3}");
        }
        if let Some(strategy) = args.rerank {
            eprintln!("  Rerank: {strategy:?}");
        }
    }

    let embedder =
        create_embedder(&config.embedding).context("failed to create embedding client")?;
    let store = open_store(&config)?;

    let embed_start = Instant::now();
    let query_embedding = embedder
        .embed_query(query)
        .await
        .context("failed to generate query embedding")?;
    let embed_ms = embed_start.elapsed().as_millis();

    let search_start = Instant::now();
    let mut results = store
        .search(query_embedding, u64::from(limit), args.min_score)
        .await
        .context("search failed")?;
    let search_ms = search_start.elapsed().as_millis();

    match args.rerank {
        Some(RerankStrategy::Keyword) => rerank(&KeywordRanker::default(), query, &mut results),
        None => {}
    }

    if verbose {
        let total_ms = start_time.elapsed().as_millis();
        eprintln!("Timing:");
        eprintln!("  Embedding: {embed_ms}ms");
        eprintln!("  Search: {search_ms}ms");
        eprintln!("  Total: {total_ms}ms");
        eprintln!();
    }

    let duration_ms = start_time.elapsed().as_millis() as u64;
    let search_results = SearchResults::new(query.to_string(), results, duration_ms);

    print!("{}", formatter.format_search_results(&search_results));

    Ok(())
}
