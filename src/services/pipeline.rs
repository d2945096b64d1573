//! Supervisor and enrichment worker pool.
//!
//! ```text
//! RecordQueue -> dispatch loop -> bounded task buffer -> N workers -> VectorStore
//! ```
//!
//! The dispatch loop is the only producer into the task buffer; a full
//! buffer blocks it, which in turn stops consumption from the queue. On
//! queue closure or a termination signal the buffer is closed and the
//! workers drain it before the supervisor reports `Stopped`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::enrich::Enricher;
use super::queue::RecordQueue;
use crate::error::{PipelineError, QueueError};
use crate::models::{Batch, PipelineConfig, decode_batch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Stopped,
    Running,
    Draining,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Stopped => write!(f, "stopped"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
        }
    }
}

/// Live counters, updated by the dispatch loop and the workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    messages_received: AtomicU64,
    messages_discarded: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_stored: AtomicU64,
    batches_failed: AtomicU64,
    records_stored: AtomicU64,
    records_skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub messages_discarded: u64,
    pub batches_dispatched: u64,
    pub batches_stored: u64,
    pub batches_failed: u64,
    pub records_stored: u64,
    pub records_skipped: u64,
}

impl PipelineStats {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            messages_received: load(&self.messages_received),
            messages_discarded: load(&self.messages_discarded),
            batches_dispatched: load(&self.batches_dispatched),
            batches_stored: load(&self.batches_stored),
            batches_failed: load(&self.batches_failed),
            records_stored: load(&self.records_stored),
            records_skipped: load(&self.records_skipped),
        }
    }
}

/// Final summary of one supervisor run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub started_at: String,
    pub duration_ms: u64,
    pub stats: StatsSnapshot,
    pub drain_timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub workers: usize,
    pub buffer_capacity: usize,
    /// Bound on the drain phase. `None` waits for every batch.
    pub drain_timeout: Option<Duration>,
}

impl From<&PipelineConfig> for SupervisorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            workers: config.workers,
            buffer_capacity: config.buffer_capacity,
            drain_timeout: config.drain_timeout(),
        }
    }
}

impl SupervisorConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Owns the worker pool lifecycle: `Stopped -> Running -> Draining -> Stopped`.
pub struct Supervisor {
    config: SupervisorConfig,
    enricher: Arc<Enricher>,
    stats: Arc<PipelineStats>,
    state: watch::Sender<PipelineState>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, enricher: Arc<Enricher>) -> Result<Self, PipelineError> {
        config.validate()?;
        let (state, _) = watch::channel(PipelineState::Stopped);
        Ok(Self {
            config,
            enricher,
            stats: Arc::new(PipelineStats::default()),
            state,
        })
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Consume `queue` until it closes or `shutdown` resolves, then drain.
    ///
    /// Returns only after every worker has exited. A queue failure is
    /// reported after the drain completes; per-record and per-batch
    /// failures are logged and counted, never returned.
    pub async fn run<Q, S>(self, mut queue: Q, shutdown: S) -> Result<PipelineReport, PipelineError>
    where
        Q: RecordQueue,
        S: Future<Output = ()> + Send,
    {
        let started_at = Utc::now();
        let start = Instant::now();

        let (tx, rx) = mpsc::channel::<Batch>(self.config.buffer_capacity);
        let rx = Arc::new(Mutex::new(rx));

        self.state.send_replace(PipelineState::Running);
        info!(
            workers = self.config.workers,
            buffer_capacity = self.config.buffer_capacity,
            "pipeline running"
        );

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&self.enricher),
                    Arc::clone(&self.stats),
                ))
            })
            .collect();
        drop(rx);

        let dispatched = self.dispatch(&mut queue, tx, shutdown).await;

        self.state.send_replace(PipelineState::Draining);
        info!("pipeline draining");
        let drain_timed_out = self.drain(workers).await;
        self.state.send_replace(PipelineState::Stopped);

        let stats = self.stats.snapshot();
        info!(
            batches_stored = stats.batches_stored,
            batches_failed = stats.batches_failed,
            records_stored = stats.records_stored,
            records_skipped = stats.records_skipped,
            messages_discarded = stats.messages_discarded,
            "pipeline stopped"
        );

        dispatched?;
        Ok(PipelineReport {
            started_at: started_at.to_rfc3339(),
            duration_ms: start.elapsed().as_millis() as u64,
            stats,
            drain_timed_out,
        })
    }

    /// Pull messages and push decoded batches into the task buffer.
    ///
    /// The buffer is closed when `tx` drops on return. A batch that has
    /// been pulled is always pushed, even if shutdown fires meanwhile.
    async fn dispatch<Q, S>(
        &self,
        queue: &mut Q,
        tx: mpsc::Sender<Batch>,
        shutdown: S,
    ) -> Result<(), PipelineError>
    where
        Q: RecordQueue,
        S: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let message = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("termination signal received, no longer accepting batches");
                    return Ok(());
                }
                message = queue.recv() => message,
            };

            let body = match message {
                Some(Ok(body)) => body,
                Some(Err(e @ QueueError::Oversized { .. })) => {
                    warn!(error = %e, "discarding oversized message");
                    PipelineStats::add(&self.stats.messages_received, 1);
                    PipelineStats::add(&self.stats.messages_discarded, 1);
                    continue;
                }
                Some(Err(e)) => {
                    error!(error = %e, "record queue failed");
                    return Err(e.into());
                }
                None => {
                    info!("record queue closed");
                    return Ok(());
                }
            };
            PipelineStats::add(&self.stats.messages_received, 1);

            let batch = match decode_batch(&body) {
                Ok(batch) if batch.is_empty() => {
                    warn!("discarding empty batch message");
                    PipelineStats::add(&self.stats.messages_discarded, 1);
                    continue;
                }
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, bytes = body.len(), "discarding malformed message");
                    PipelineStats::add(&self.stats.messages_discarded, 1);
                    continue;
                }
            };

            let batch_size = batch.len();
            if tx.send(batch).await.is_err() {
                error!("task buffer closed with no workers left");
                return Ok(());
            }
            PipelineStats::add(&self.stats.batches_dispatched, 1);
            debug!(batch_size, "batch dispatched");
        }
    }

    /// Wait for every worker. Returns true if the drain deadline expired.
    async fn drain(&self, workers: Vec<JoinHandle<()>>) -> bool {
        let wait_all = async {
            for handle in workers {
                if let Err(e) = handle.await {
                    error!(error = %e, "worker task failed");
                }
            }
        };
        tokio::pin!(wait_all);

        let Some(limit) = self.config.drain_timeout else {
            wait_all.await;
            return false;
        };

        match tokio::time::timeout(limit, &mut wait_all).await {
            Ok(()) => false,
            Err(_) => {
                warn!(
                    timeout_secs = limit.as_secs_f64(),
                    "drain deadline expired, cancelling pending embedding calls"
                );
                self.enricher.cancel_token().cancel();
                wait_all.await;
                true
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<Batch>>>,
    enricher: Arc<Enricher>,
    stats: Arc<PipelineStats>,
) {
    debug!(worker_id, "worker started");

    loop {
        let batch = { tasks.lock().await.recv().await };
        let Some(batch) = batch else {
            break;
        };
        let batch_size = batch.len();

        // A panic inside one batch must not take the worker down with it.
        let job = {
            let enricher = Arc::clone(&enricher);
            tokio::spawn(async move { enricher.store_batch(&batch).await })
        };

        match job.await {
            Ok(Ok(outcome)) => {
                PipelineStats::add(&stats.records_stored, outcome.stored);
                PipelineStats::add(&stats.records_skipped, outcome.skipped);
                if outcome.stored > 0 {
                    PipelineStats::add(&stats.batches_stored, 1);
                }
                info!(
                    worker_id,
                    batch_size,
                    stored = outcome.stored,
                    skipped = outcome.skipped,
                    "batch processed"
                );
            }
            Ok(Err(e)) => {
                PipelineStats::add(&stats.batches_failed, 1);
                error!(worker_id, batch_size, error = %e, "batch upsert failed");
            }
            Err(e) => {
                PipelineStats::add(&stats.batches_failed, 1);
                error!(worker_id, batch_size, error = %e, "batch task aborted");
            }
        }
    }

    debug!(worker_id, "worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use crate::services::queue::{JsonLinesQueue, channel_queue};
    use crate::services::rate_limit::RateLimiter;
    use crate::services::test_support::{MockEmbedder, MockStore};
    use async_trait::async_trait;
    use tokio::sync::{Semaphore, oneshot};

    fn config(workers: usize, buffer_capacity: usize) -> SupervisorConfig {
        SupervisorConfig {
            workers,
            buffer_capacity,
            drain_timeout: None,
        }
    }

    fn enricher(embedder: MockEmbedder, store: Arc<MockStore>, limiter: RateLimiter) -> Arc<Enricher> {
        Arc::new(Enricher::new(Arc::new(embedder), store, Arc::new(limiter)))
    }

    fn record_batch(ids: &[&str]) -> Vec<CandidateRecord> {
        ids.iter()
            .map(|id| CandidateRecord::new(*id, format!("abstract of {}", id)))
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_rejects_zero_workers() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(MockEmbedder::new(4), store, RateLimiter::new(Duration::ZERO));
        assert!(matches!(
            Supervisor::new(config(0, 10), enricher),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(MockEmbedder::new(4), store, RateLimiter::new(Duration::ZERO));
        let supervisor = Supervisor::new(config(2, 10), enricher).unwrap();
        assert_eq!(supervisor.state(), PipelineState::Stopped);

        let mut state = supervisor.subscribe_state();
        let (publisher, queue) = channel_queue(10);
        let handle = tokio::spawn(supervisor.run(queue, std::future::pending()));

        state
            .wait_for(|s| *s == PipelineState::Running)
            .await
            .unwrap();
        drop(publisher);

        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn test_malformed_and_empty_messages_discarded() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(2, 10), enricher).unwrap();

        let (publisher, queue) = channel_queue(10);
        publisher.publish(b"not json".to_vec()).await.unwrap();
        publisher.publish(b"[]".to_vec()).await.unwrap();
        publisher.publish_batch(&record_batch(&["a"])).await.unwrap();
        drop(publisher);

        let report = supervisor.run(queue, std::future::pending()).await.unwrap();

        assert_eq!(report.stats.messages_received, 3);
        assert_eq!(report.stats.messages_discarded, 2);
        assert_eq!(report.stats.batches_dispatched, 1);
        assert_eq!(report.stats.records_stored, 1);
        assert_eq!(store.stored_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_message_discarded_without_stopping() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(2, 10), enricher).unwrap();

        let input: &[u8] = b"[{\"id\":\"a\",\"summary\":\"first\"}]\n\
            [{\"id\":\"\xff\xfe\",\"summary\":\"bad\"}]\n\
            [{\"id\":\"c\",\"summary\":\"third\"}]\n";
        let report = supervisor
            .run(JsonLinesQueue::new(input), std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.stats.messages_received, 3);
        assert_eq!(report.stats.messages_discarded, 1);
        assert_eq!(report.stats.records_stored, 2);
        let mut stored = store.stored_ids();
        stored.sort();
        assert_eq!(stored, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_oversized_message_discarded_without_stopping() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(1, 10), enricher).unwrap();

        let long_summary = "x".repeat(200);
        let input = format!(
            "[{{\"id\":\"a\",\"summary\":\"s\"}}]\n\
             [{{\"id\":\"big\",\"summary\":\"{}\"}}]\n\
             [{{\"id\":\"c\",\"summary\":\"s\"}}]\n",
            long_summary
        );
        let queue = JsonLinesQueue::new(input.as_bytes()).with_max_message_bytes(64);
        let report = supervisor.run(queue, std::future::pending()).await.unwrap();

        assert_eq!(report.stats.messages_received, 3);
        assert_eq!(report.stats.messages_discarded, 1);
        assert_eq!(store.stored_ids(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_panicking_batch_counted_as_failed() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(1, 10), enricher).unwrap();

        let (publisher, queue) = channel_queue(10);
        publisher.publish_batch(&record_batch(&["a"])).await.unwrap();
        publisher
            .publish_batch(&[CandidateRecord::new("p", "panic in the embedder")])
            .await
            .unwrap();
        publisher.publish_batch(&record_batch(&["c"])).await.unwrap();
        drop(publisher);

        let report = supervisor.run(queue, std::future::pending()).await.unwrap();

        assert_eq!(report.stats.batches_dispatched, 3);
        assert_eq!(report.stats.batches_failed, 1);
        assert_eq!(report.stats.batches_stored, 2);
        assert_eq!(store.stored_ids(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_dispatch() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4).gated(gate.clone()),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(1, 1), enricher).unwrap();
        let stats = supervisor.stats();

        let (publisher, queue) = channel_queue(10);
        for id in ["b0", "b1", "b2", "b3"] {
            publisher.publish_batch(&record_batch(&[id])).await.unwrap();
        }
        drop(publisher);

        let handle = tokio::spawn(supervisor.run(queue, std::future::pending()));

        // One batch in the worker, one in the buffer, one held by dispatch.
        wait_until(|| stats.snapshot().messages_received == 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 3);
        assert_eq!(snapshot.batches_dispatched, 2);
        assert_eq!(snapshot.records_stored, 0);

        gate.add_permits(4);
        let report = handle.await.unwrap().unwrap();

        assert_eq!(report.stats.batches_dispatched, 4);
        assert_eq!(report.stats.records_stored, 4);
        assert_eq!(store.stored_ids(), vec!["b0", "b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_batches_only() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(
            MockEmbedder::new(4).gated(gate.clone()),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(1, 1), enricher).unwrap();
        let stats = supervisor.stats();

        let (publisher, queue) = channel_queue(10);
        for id in ["a", "b", "c", "d", "e"] {
            publisher.publish_batch(&record_batch(&[id])).await.unwrap();
        }

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stop_rx.await;
        };
        let handle = tokio::spawn(supervisor.run(queue, shutdown));

        wait_until(|| stats.snapshot().messages_received == 3).await;
        stop_tx.send(()).unwrap();
        gate.add_permits(5);

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stats.messages_received, 3);
        assert_eq!(report.stats.records_stored, 3);
        assert!(!report.drain_timed_out);
        assert_eq!(store.stored_ids(), vec!["a", "b", "c"]);
        drop(publisher);
    }

    #[tokio::test]
    async fn test_failed_batches_do_not_stop_pool() {
        let store = Arc::new(MockStore::existing());
        store.fail_upserts.store(true, std::sync::atomic::Ordering::SeqCst);
        let enricher = enricher(
            MockEmbedder::new(4),
            store.clone(),
            RateLimiter::new(Duration::ZERO),
        );
        let supervisor = Supervisor::new(config(2, 10), enricher).unwrap();

        let (publisher, queue) = channel_queue(10);
        for id in ["a", "b", "c"] {
            publisher.publish_batch(&record_batch(&[id])).await.unwrap();
        }
        drop(publisher);

        let report = supervisor.run(queue, std::future::pending()).await.unwrap();
        assert_eq!(report.stats.batches_failed, 3);
        assert_eq!(report.stats.batches_dispatched, 3);
        assert_eq!(report.stats.records_stored, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline_cancels_rate_limited_records() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(MockEmbedder::new(4), store.clone(), RateLimiter::per_minute(1));
        let supervisor = Supervisor::new(
            SupervisorConfig {
                workers: 1,
                buffer_capacity: 10,
                drain_timeout: Some(Duration::from_secs(1)),
            },
            enricher,
        )
        .unwrap();

        let (publisher, queue) = channel_queue(10);
        publisher
            .publish_batch(&record_batch(&["a", "b", "c"]))
            .await
            .unwrap();
        drop(publisher);

        let report = supervisor.run(queue, std::future::pending()).await.unwrap();

        assert!(report.drain_timed_out);
        assert_eq!(report.stats.records_stored, 1);
        assert_eq!(report.stats.records_skipped, 2);
        assert_eq!(store.stored_ids(), vec!["a"]);
    }

    struct BrokenQueue;

    #[async_trait]
    impl RecordQueue for BrokenQueue {
        async fn recv(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
            Some(Err(QueueError::Disconnected("broker went away".to_string())))
        }
    }

    #[tokio::test]
    async fn test_queue_failure_is_fatal_after_drain() {
        let store = Arc::new(MockStore::existing());
        let enricher = enricher(MockEmbedder::new(4), store, RateLimiter::new(Duration::ZERO));
        let supervisor = Supervisor::new(config(2, 10), enricher).unwrap();
        let state = supervisor.subscribe_state();

        let result = supervisor.run(BrokenQueue, std::future::pending()).await;

        assert!(matches!(result, Err(PipelineError::Queue(_))));
        assert_eq!(*state.borrow(), PipelineState::Stopped);
    }
}
