mod config;
mod consume;
mod explain;
mod list;
mod provision;
mod search;
mod show;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{VectorStore, create_backend};

pub use config::ConfigCommand;
pub use consume::ConsumeArgs;
pub use explain::ExplainArgs;
pub use list::ListArgs;
pub use search::SearchArgs;
pub use show::ShowArgs;

pub use config::handle_config;
pub use consume::handle_consume;
pub use explain::handle_explain;
pub use list::handle_list;
pub use provision::handle_provision;
pub use search::handle_search;
pub use show::handle_show;
pub use status::handle_status;

fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    create_backend(&config.vector_store, u64::from(config.embedding.dimension))
        .with_context(|| format!("failed to connect to Qdrant at {}", config.vector_store.url))
}
