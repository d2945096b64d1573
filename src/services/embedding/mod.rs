//! Embedding providers.
//!
//! Every provider turns one text into one fixed-length vector. The pipeline
//! only sees the [`Embedder`] trait; which remote service backs it is chosen
//! by [`create_embedder`] from configuration.

mod gemini;
mod server;

use std::sync::Arc;

use async_trait::async_trait;

pub(crate) use gemini::normalize_model;
pub use gemini::GeminiEmbedder;
pub use server::ServerEmbedder;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProvider};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Configured output dimension. Providers do not enforce it.
    fn dimension(&self) -> usize;

    /// Embed a document for storage.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a search query. Providers that distinguish the two override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Gemini => Arc::new(GeminiEmbedder::new(config)?),
        EmbeddingProvider::Server => Arc::new(ServerEmbedder::new(config)?),
    };
    Ok(embedder)
}

fn map_send_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout
    } else if e.is_connect() {
        EmbeddingError::ConnectionError(e.to_string())
    } else {
        EmbeddingError::RequestError(e)
    }
}
