//! Vector store abstraction layer.
//!
//! The pipeline writes through [`VectorStore::upsert_points`]; the read-side
//! commands use `search`, `find_by_record_id` and `sample`. Qdrant is the only backend,
//! but everything above this module holds an `Arc<dyn VectorStore>` so tests
//! can substitute an in-memory store.

mod qdrant;

pub use qdrant::QdrantBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{CandidateRecord, ScoredRecord, StoredPoint, VectorStoreConfig};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is reachable.
    async fn health_check(&self) -> Result<(), VectorStoreError>;

    async fn collection_exists(&self) -> Result<bool, VectorStoreError>;

    /// Create the collection with the backend's dimension and cosine distance.
    ///
    /// Fails if the collection already exists; callers that need
    /// idempotence go through `services::provision::ensure_collection`.
    async fn create_collection(&self) -> Result<(), VectorStoreError>;

    /// Number of stored points, or `None` if the collection doesn't exist.
    async fn point_count(&self) -> Result<Option<u64>, VectorStoreError>;

    /// Write all points in a single call.
    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError>;

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: u64,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;

    /// Look up a stored record by its natural identifier.
    ///
    /// Re-ingestion may have stored the same record more than once; any one
    /// of the copies is returned.
    async fn find_by_record_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CandidateRecord>, VectorStoreError>;

    /// Up to `limit` stored records drawn at random.
    async fn sample(&self, limit: u64) -> Result<Vec<CandidateRecord>, VectorStoreError>;

    fn collection(&self) -> &str;
}

/// Create the configured backend with vectors of `dimension` floats.
pub fn create_backend(
    config: &VectorStoreConfig,
    dimension: u64,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let backend = QdrantBackend::new(config, dimension)?;
    Ok(Arc::new(backend))
}
