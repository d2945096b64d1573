use anyhow::{Context, Result};

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{Provisioned, ensure_collection};
use crate::utils::RetryConfig;

pub async fn handle_provision(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let store = open_store(&config)?;

    let outcome = ensure_collection(store.as_ref(), &RetryConfig::default())
        .await
        .context("collection provisioning failed")?;

    let message = match outcome {
        Provisioned::Created => format!(
            "Created collection '{}' ({} dimensions, cosine)",
            store.collection(),
            config.embedding.dimension
        ),
        Provisioned::AlreadyExisted => {
            format!("Collection '{}' already exists", store.collection())
        }
    };
    print!("{}", formatter.format_message(&message));

    Ok(())
}
