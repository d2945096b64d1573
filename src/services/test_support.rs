//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::embedding::Embedder;
use super::vector_store::VectorStore;
use crate::error::{EmbeddingError, VectorStoreError};
use crate::models::{CandidateRecord, ScoredRecord, StoredPoint, record_from_payload};

/// Returns a constant vector. Texts containing "fail" are rejected and
/// texts containing "panic" panic the calling task.
pub struct MockEmbedder {
    dimension: usize,
    output_len: usize,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            output_len: dimension,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn with_output_len(mut self, len: usize) -> Self {
        self.output_len = len;
        self
    }

    /// Every call consumes one permit from `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            gate.acquire()
                .await
                .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?
                .forget();
        }
        if text.contains("panic") {
            panic!("embedder panicked on {:?}", text);
        }
        if text.contains("fail") {
            return Err(EmbeddingError::ServerError(
                "status 500 Internal Server Error: boom".to_string(),
            ));
        }
        Ok(vec![0.25; self.output_len])
    }
}

#[derive(Default)]
pub struct MockStore {
    pub exists: AtomicBool,
    pub fail_upserts: AtomicBool,
    pub fail_create: AtomicBool,
    /// Number of upcoming `collection_exists` calls that fail transiently.
    pub flaky_exists: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub upserts: Mutex<Vec<Vec<StoredPoint>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn existing() -> Self {
        let store = Self::default();
        store.exists.store(true, Ordering::SeqCst);
        store
    }

    pub fn upserts(&self) -> Vec<Vec<StoredPoint>> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.upserts()
            .iter()
            .flatten()
            .filter_map(|point| point.record_id().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl VectorStore for MockStore {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        let flaky = self.flaky_exists.load(Ordering::SeqCst);
        if flaky > 0 {
            self.flaky_exists.store(flaky - 1, Ordering::SeqCst);
            return Err(VectorStoreError::ConnectionError("connection refused".to_string()));
        }
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(VectorStoreError::CollectionError("permission denied".to_string()));
        }
        if self.exists.swap(true, Ordering::SeqCst) {
            return Err(VectorStoreError::CollectionError("already exists".to_string()));
        }
        Ok(())
    }

    async fn point_count(&self) -> Result<Option<u64>, VectorStoreError> {
        if !self.exists.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.upserts().iter().map(Vec::len).sum::<usize>() as u64))
    }

    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorStoreError::UpsertError("bad request".to_string()));
        }
        self.upserts.lock().unwrap().push(points);
        Ok(())
    }

    async fn search(
        &self,
        _query_vector: Vec<f32>,
        limit: u64,
        _min_score: Option<f32>,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        Ok(self
            .upserts()
            .iter()
            .flatten()
            .take(limit as usize)
            .map(|point| ScoredRecord {
                record: record_from_payload(&point.payload),
                score: 1.0,
            })
            .collect())
    }

    async fn find_by_record_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CandidateRecord>, VectorStoreError> {
        Ok(self
            .upserts()
            .iter()
            .flatten()
            .find(|point| point.record_id() == Some(record_id))
            .map(|point| record_from_payload(&point.payload)))
    }

    /// Stored records in insertion order.
    async fn sample(&self, limit: u64) -> Result<Vec<CandidateRecord>, VectorStoreError> {
        Ok(self
            .upserts()
            .iter()
            .flatten()
            .take(limit as usize)
            .map(|point| record_from_payload(&point.payload))
            .collect())
    }

    fn collection(&self) -> &str {
        "papers"
    }
}
