use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(required = true, help = "Record identifier, e.g. http://arxiv.org/abs/2401.00001v1")]
    pub id: String,
}

pub async fn handle_show(args: ShowArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let id = args.id.trim();
    if id.is_empty() {
        anyhow::bail!("record id cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let store = open_store(&config)?;

    let record = store
        .find_by_record_id(id)
        .await
        .context("lookup failed")?
        .with_context(|| format!("no stored record with id '{}'", id))?;

    print!("{}", formatter.format_record(&record));
    Ok(())
}
