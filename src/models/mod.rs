mod config;
mod point;
mod record;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EXPLAIN_MODEL, DEFAULT_GEMINI_URL, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_QDRANT_URL,
    EmbeddingConfig, EmbeddingProvider, ExplainConfig, PipelineConfig, SearchConfig,
    VectorStoreConfig,
};
pub use point::{Payload, StoredPoint, record_from_payload, record_to_payload};
pub use record::{Author, Batch, CandidateRecord, Link, decode_batch};
pub use search::{OutputFormat, ScoredRecord, SearchResults};
