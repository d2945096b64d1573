use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, short = 'n', default_value_t = 10, help = "Number of records to show")]
    pub limit: u32,
}

/// Print a random sample of stored records.
pub async fn handle_list(args: ListArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    if args.limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let store = open_store(&config)?;

    let records = store
        .sample(u64::from(args.limit))
        .await
        .context("failed to sample stored records")?;

    print!("{}", formatter.format_records(&records));
    Ok(())
}
