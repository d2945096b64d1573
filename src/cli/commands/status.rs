use anyhow::Result;

use super::open_store;
use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::create_embedder;

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let embedding_healthy = match create_embedder(&config.embedding) {
        Ok(embedder) => embedder.health_check().await.is_ok(),
        Err(_) => false,
    };

    let (connected, collection_exists, points) = match open_store(&config) {
        Ok(store) => {
            let connected = store.health_check().await.is_ok();
            if connected {
                let exists = store.collection_exists().await.unwrap_or(false);
                let points = if exists {
                    store.point_count().await.ok().flatten()
                } else {
                    None
                };
                (true, exists, points)
            } else {
                (false, false, None)
            }
        }
        Err(_) => (false, false, None),
    };

    let status = StatusInfo {
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model: config.embedding.model.clone(),
        embedding_url: config.embedding.url.clone(),
        embedding_healthy,
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected: connected,
        collection: config.vector_store.collection.clone(),
        collection_exists,
        points,
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_healthy {
        eprintln!();
        eprintln!(
            "Warning: embedding service not reachable at {} (check the URL and API key)",
            config.embedding.url
        );
    }

    if !connected {
        eprintln!();
        eprintln!("Warning: Qdrant not reachable. Start with: docker compose up -d qdrant");
    } else if !collection_exists {
        eprintln!();
        eprintln!("Hint: collection missing. Create it with: scholar-ingest provision");
    }

    Ok(())
}
