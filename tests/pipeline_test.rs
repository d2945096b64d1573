use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use scholar_ingest::error::{EmbeddingError, VectorStoreError};
use scholar_ingest::models::{CandidateRecord, ScoredRecord, StoredPoint, record_from_payload};
use scholar_ingest::services::{
    Embedder, Enricher, JsonLinesQueue, PipelineState, Provisioned, RateLimiter, Supervisor,
    SupervisorConfig, VectorStore, channel_queue, ensure_collection,
};
use scholar_ingest::utils::RetryConfig;

const DIMENSION: usize = 768;

struct FixedEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("unembeddable") {
            return Err(EmbeddingError::EmptyEmbedding);
        }
        Ok(vec![0.1; DIMENSION])
    }
}

#[derive(Default)]
struct MemoryStore {
    created: Mutex<bool>,
    upserts: Mutex<Vec<Vec<StoredPoint>>>,
}

impl MemoryStore {
    fn points(&self) -> Vec<StoredPoint> {
        self.upserts.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        Ok(*self.created.lock().unwrap())
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        let mut created = self.created.lock().unwrap();
        if *created {
            return Err(VectorStoreError::CollectionError("already exists".to_string()));
        }
        *created = true;
        Ok(())
    }

    async fn point_count(&self) -> Result<Option<u64>, VectorStoreError> {
        Ok(Some(self.points().len() as u64))
    }

    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError> {
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
            .points()
            .iter()
            .take(limit as usize)
            .map(|p| ScoredRecord {
                record: record_from_payload(&p.payload),
                score: 0.5,
            })
            .collect())
    }

    async fn find_by_record_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CandidateRecord>, VectorStoreError> {
        Ok(self
            .points()
            .iter()
            .find(|p| p.record_id() == Some(record_id))
            .map(|p| record_from_payload(&p.payload)))
    }

    async fn sample(&self, limit: u64) -> Result<Vec<CandidateRecord>, VectorStoreError> {
        Ok(self
            .points()
            .iter()
            .rev()
            .take(limit as usize)
            .map(|p| record_from_payload(&p.payload))
            .collect())
    }

    fn collection(&self) -> &str {
        "papers"
    }
}

fn supervisor(store: Arc<MemoryStore>, embedder: Arc<FixedEmbedder>, workers: usize) -> Supervisor {
    let enricher = Enricher::new(embedder, store, Arc::new(RateLimiter::new(Duration::ZERO)));
    Supervisor::new(
        SupervisorConfig {
            workers,
            buffer_capacity: 10,
            drain_timeout: None,
        },
        Arc::new(enricher),
    )
    .unwrap()
}

#[tokio::test]
async fn test_provision_then_consume_json_lines() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(FixedEmbedder {
        calls: AtomicUsize::new(0),
    });

    let retry = RetryConfig::new(1);
    assert_eq!(
        ensure_collection(store.as_ref(), &retry).await.unwrap(),
        Provisioned::Created
    );
    assert_eq!(
        ensure_collection(store.as_ref(), &retry).await.unwrap(),
        Provisioned::AlreadyExisted
    );

    let input = concat!(
        r#"[{"id":"a","summary":"quantum computing advances","authors":[{"name":"Ada"}],"categories":["quant-ph"],"primaryCategory":"quant-ph","doi":null},{"id":"b","summary":""}]"#,
        "\n",
        "{not json\n",
        r#"[{"id":"c","summary":"graph neural networks","links":null,"journalRef":"Nature 1"}]"#,
        "\n",
        r#"[{"id":"d","summary":"unembeddable text"}]"#,
        "\n",
    );
    let queue = JsonLinesQueue::new(input.as_bytes());

    let supervisor = supervisor(store.clone(), embedder.clone(), 3);
    let state = supervisor.subscribe_state();
    let report = supervisor
        .run(queue, std::future::pending())
        .await
        .unwrap();

    assert_eq!(*state.borrow(), PipelineState::Stopped);
    assert_eq!(report.stats.messages_received, 4);
    assert_eq!(report.stats.messages_discarded, 1);
    assert_eq!(report.stats.batches_dispatched, 3);
    assert_eq!(report.stats.records_stored, 2);
    assert_eq!(report.stats.records_skipped, 2);
    assert!(!report.drain_timed_out);

    // "b" has a blank abstract and never reaches the embedder.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

    let stored: HashSet<_> = store
        .points()
        .iter()
        .filter_map(|p| p.record_id().map(str::to_string))
        .collect();
    assert_eq!(stored, HashSet::from(["a".to_string(), "c".to_string()]));

    let a = store.find_by_record_id("a").await.unwrap().unwrap();
    assert_eq!(a.authors[0].name, "Ada");
    assert_eq!(a.primary_category, "quant-ph");
    assert_eq!(a.doi, None);
    let c = store.find_by_record_id("c").await.unwrap().unwrap();
    assert_eq!(c.journal_ref.as_deref(), Some("Nature 1"));
    assert!(c.links.is_empty());
}

#[tokio::test]
async fn test_many_producers_no_batch_lost() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(FixedEmbedder {
        calls: AtomicUsize::new(0),
    });
    let (publisher, queue) = channel_queue(4);

    let mut producers = Vec::new();
    for p in 0..4 {
        let publisher = publisher.clone();
        producers.push(tokio::spawn(async move {
            for b in 0..10 {
                let batch: Vec<_> = (0..3)
                    .map(|r| CandidateRecord::new(format!("{}-{}-{}", p, b, r), "abstract"))
                    .collect();
                publisher.publish_batch(&batch).await.unwrap();
            }
        }));
    }
    drop(publisher);

    let run = tokio::spawn(supervisor(store.clone(), embedder, 4).run(queue, std::future::pending()));
    for producer in producers {
        producer.await.unwrap();
    }
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.stats.batches_dispatched, 40);
    assert_eq!(report.stats.batches_stored, 40);
    assert_eq!(report.stats.records_stored, 120);

    let points = store.points();
    let surrogate_ids: HashSet<_> = points.iter().map(|p| p.id.clone()).collect();
    assert_eq!(surrogate_ids.len(), 120);
    assert!(points.iter().all(|p| p.vector.len() == DIMENSION));
}
