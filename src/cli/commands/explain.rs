use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{ExplainRequest, GeminiExplainer, analyze, create_embedder};

#[derive(Debug, Args)]
pub struct ExplainArgs {
    #[arg(required = true, help = "Passage to explain")]
    pub text: String,

    #[arg(long, short = 't', default_value = "", help = "Title of the paper the passage comes from")]
    pub title: String,

    #[arg(long, short = 'q', help = "Search related papers with this text instead of the passage")]
    pub query: Option<String>,

    #[arg(long, short = 'p', help = "System prompt that replaces the default instruction")]
    pub prompt: Option<String>,

    #[arg(long, short = 'n', help = "Number of related papers to return")]
    pub limit: Option<u32>,
}

pub async fn handle_explain(args: ExplainArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    if args.text.trim().is_empty() {
        anyhow::bail!("text to explain cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);

    let limit = args.limit.unwrap_or(config.explain.related_limit);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let explainer = GeminiExplainer::new(&config.explain, config.embedding.api_key.as_deref())
        .context("failed to create explanation client")?;
    let embedder =
        create_embedder(&config.embedding).context("failed to create embedding client")?;
    let store = open_store(&config)?;

    let request = ExplainRequest::new(args.text)
        .with_title(args.title)
        .with_search_query(args.query)
        .with_custom_prompt(args.prompt);

    if verbose {
        eprintln!("Model: {}", config.explain.model);
        eprintln!("  Related search: \"{}\"", request.search_text());
        eprintln!("  Limit: {limit}");
    }

    let analysis = analyze(
        &explainer,
        embedder.as_ref(),
        store.as_ref(),
        &request,
        u64::from(limit),
    )
    .await
    .context("analysis failed")?;

    print!("{}", formatter.format_analysis(&analysis));
    Ok(())
}
