//! Per-record enrichment and the one-upsert-per-batch write.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::embedding::Embedder;
use super::rate_limit::RateLimiter;
use super::vector_store::VectorStore;
use crate::error::{EmbeddingError, VectorStoreError};
use crate::models::{CandidateRecord, StoredPoint};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a record produced no point.
#[derive(Debug)]
pub enum SkipReason {
    BlankSummary,
    Embedding(EmbeddingError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BlankSummary => write!(f, "empty abstract"),
            SkipReason::Embedding(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub struct SkippedRecord {
    pub record_id: String,
    pub reason: SkipReason,
}

/// Result of enriching one batch.
#[derive(Debug, Default)]
pub struct Enrichment {
    /// One point per surviving record, in input order.
    pub points: Vec<StoredPoint>,
    pub skipped: Vec<SkippedRecord>,
    pub dimension_mismatches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub stored: usize,
    pub skipped: usize,
}

/// Turns candidate records into stored points.
///
/// Shared by every worker; the embedder, store and limiter are all
/// reference-counted handles that are safe for concurrent use.
pub struct Enricher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    limiter: Arc<RateLimiter>,
    dimension: usize,
    embed_timeout: Duration,
    cancel: CancelToken,
}

impl Enricher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            store,
            limiter,
            dimension,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts pending rate-limiter waits.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Rate-limited, time-bounded embedding of one record's abstract.
    async fn embed_record(&self, record: &CandidateRecord) -> Result<Vec<f32>, EmbeddingError> {
        self.limiter.acquire(&self.cancel).await?;

        match tokio::time::timeout(self.embed_timeout, self.embedder.embed(&record.summary)).await
        {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout),
        }
    }

    /// Enrich records left to right. Failures drop the record, never the batch.
    pub async fn enrich(&self, batch: &[CandidateRecord]) -> Enrichment {
        let mut enrichment = Enrichment {
            points: Vec::with_capacity(batch.len()),
            ..Default::default()
        };

        for record in batch {
            if record.has_blank_summary() {
                info!(record_id = %record.id, "skipping record with empty abstract");
                enrichment.skipped.push(SkippedRecord {
                    record_id: record.id.clone(),
                    reason: SkipReason::BlankSummary,
                });
                continue;
            }

            let vector = match self.embed_record(record).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "embedding failed, dropping record");
                    enrichment.skipped.push(SkippedRecord {
                        record_id: record.id.clone(),
                        reason: SkipReason::Embedding(e),
                    });
                    continue;
                }
            };

            if vector.len() != self.dimension {
                warn!(
                    record_id = %record.id,
                    expected = self.dimension,
                    actual = vector.len(),
                    "embedding dimension mismatch"
                );
                enrichment.dimension_mismatches += 1;
            }

            enrichment
                .points
                .push(StoredPoint::from_record(record, vector));
        }

        enrichment
    }

    /// Enrich a batch and write the survivors in exactly one upsert.
    ///
    /// An all-skipped batch succeeds without touching the store. Upsert
    /// errors are returned as-is and never retried here.
    pub async fn store_batch(
        &self,
        batch: &[CandidateRecord],
    ) -> Result<BatchOutcome, VectorStoreError> {
        let enrichment = self.enrich(batch).await;
        let outcome = BatchOutcome {
            stored: enrichment.points.len(),
            skipped: enrichment.skipped.len(),
        };

        if enrichment.points.is_empty() {
            debug!(batch_size = batch.len(), "no points to store");
            return Ok(outcome);
        }

        self.store.upsert_points(enrichment.points).await?;
        Ok(outcome)
    }
}
