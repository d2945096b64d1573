//! Error types for the ingestion pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding service: {0}")]
    ConnectionError(String),

    #[error("embedding service error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("received empty embedding")]
    EmptyEmbedding,

    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("missing API key: {0}")]
    MissingApiKey(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("embedding call cancelled: {0}")]
    Cancelled(#[from] RateLimitError),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("resource exhausted")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::EmptyEmbedding
            | EmbeddingError::EmptyInput
            | EmbeddingError::MissingApiKey(_)
            | EmbeddingError::Cancelled(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to Qdrant: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::SearchError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Errors raised while waiting on the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

/// Errors related to the inbound record queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("queue connection lost: {0}")]
    Disconnected(String),

    /// A single message over the size limit. The queue itself stays usable.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: usize, limit: usize },
}

/// Errors from text generation (passage explanations).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("cannot explain empty text")]
    EmptyInput,

    #[error("missing API key: {0}")]
    MissingApiKey(String),

    #[error("failed to connect to generation service: {0}")]
    ConnectionError(String),

    #[error("generation service error: {0}")]
    ServerError(String),

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation returned no text")]
    EmptyResponse,

    #[error("generation timeout")]
    Timeout,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Fatal pipeline errors. Per-record and per-batch failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("collection provisioning failed: {0}")]
    Provisioning(#[source] VectorStoreError),

    #[error("record queue failed: {0}")]
    Queue(#[from] QueueError),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
}
