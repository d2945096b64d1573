mod cancel;
mod embedding;
mod enrich;
mod explain;
mod pipeline;
mod provision;
mod queue;
mod rate_limit;
mod ranking;
mod vector_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::CancelToken;
pub use embedding::{Embedder, GeminiEmbedder, ServerEmbedder, create_embedder};
pub use enrich::{BatchOutcome, Enricher, Enrichment, SkipReason, SkippedRecord};
pub use explain::{
    Analysis, ExplainRequest, Explainer, GeminiExplainer, SYSTEM_PROMPT, analyze,
};
pub use pipeline::{
    PipelineReport, PipelineState, PipelineStats, StatsSnapshot, Supervisor, SupervisorConfig,
};
pub use provision::{Provisioned, ensure_collection};
pub use queue::{
    ChannelQueue, JsonLinesQueue, QueuePublisher, RecordQueue, channel_queue, stdin_queue,
};
pub use rate_limit::RateLimiter;
pub use ranking::{KeywordRanker, Ranker, rerank};
pub use vector_store::{QdrantBackend, VectorStore, create_backend};
