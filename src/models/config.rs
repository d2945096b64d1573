use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "papers";
pub const DEFAULT_EXPLAIN_MODEL: &str = "models/gemini-1.5-pro";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub explain: ExplainConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scholar-ingest").join("config.toml"))
    }

    /// Load the user config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.vector_store.url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(collection) = lookup("SCHOLAR_COLLECTION") {
            self.vector_store.collection = collection;
        }
        if let Some(workers) = lookup("SCHOLAR_WORKERS") {
            self.pipeline.workers = parse_env("SCHOLAR_WORKERS", &workers)?;
        }
        if let Some(rpm) = lookup("SCHOLAR_RPM") {
            self.pipeline.requests_per_minute = parse_env("SCHOLAR_RPM", &rpm)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(msg.to_string()))
        };
        if self.pipeline.workers == 0 {
            return invalid("pipeline.workers must be at least 1");
        }
        if self.pipeline.buffer_capacity == 0 {
            return invalid("pipeline.buffer_capacity must be at least 1");
        }
        if self.pipeline.requests_per_minute == 0 {
            return invalid("pipeline.requests_per_minute must be at least 1");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be at least 1");
        }
        if self.embedding.timeout_secs == 0 {
            return invalid("embedding.timeout_secs must be at least 1");
        }
        if self.vector_store.collection.trim().is_empty() {
            return invalid("vector_store.collection cannot be empty");
        }
        if self.pipeline.max_message_bytes == 0 {
            return invalid("pipeline.max_message_bytes must be at least 1");
        }
        if self.explain.related_limit == 0 {
            return invalid("explain.related_limit must be at least 1");
        }
        if self.explain.timeout_secs == 0 {
            return invalid("explain.timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Set a single dotted key such as `pipeline.workers`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "embedding.provider" => {
                self.embedding.provider = value.parse().map_err(ConfigError::ValidationError)?
            }
            "embedding.url" => self.embedding.url = value.to_string(),
            "embedding.model" => self.embedding.model = value.to_string(),
            "embedding.api_key" => self.embedding.api_key = Some(value.to_string()),
            "embedding.dimension" => self.embedding.dimension = parse_env(key, value)?,
            "embedding.timeout_secs" => self.embedding.timeout_secs = parse_env(key, value)?,
            "vector_store.url" => self.vector_store.url = value.to_string(),
            "vector_store.collection" => self.vector_store.collection = value.to_string(),
            "vector_store.api_key" => self.vector_store.api_key = Some(value.to_string()),
            "pipeline.workers" => self.pipeline.workers = parse_env(key, value)?,
            "pipeline.buffer_capacity" => self.pipeline.buffer_capacity = parse_env(key, value)?,
            "pipeline.requests_per_minute" => {
                self.pipeline.requests_per_minute = parse_env(key, value)?
            }
            "pipeline.drain_timeout_secs" => {
                self.pipeline.drain_timeout_secs = Some(parse_env(key, value)?)
            }
            "pipeline.max_message_bytes" => {
                self.pipeline.max_message_bytes = parse_env(key, value)?
            }
            "search.default_limit" => self.search.default_limit = parse_env(key, value)?,
            "search.default_format" => {
                self.search.default_format = value.parse().map_err(ConfigError::ValidationError)?
            }
            "explain.url" => self.explain.url = value.to_string(),
            "explain.model" => self.explain.model = value.to_string(),
            "explain.timeout_secs" => self.explain.timeout_secs = parse_env(key, value)?,
            "explain.related_limit" => self.explain.related_limit = parse_env(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid value for {key}: {value}")))
}

/// Which remote service produces embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Google Generative Language `embedContent` API
    #[default]
    Gemini,
    /// Self-hosted server exposing `POST /embed`
    Server,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(EmbeddingProvider::Gemini),
            "server" => Ok(EmbeddingProvider::Server),
            _ => Err(format!("unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Gemini => write!(f, "gemini"),
            EmbeddingProvider::Server => write!(f, "server"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_url() -> String {
    DEFAULT_GEMINI_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            api_key: None,
            dimension: default_dimension(),
            timeout_secs: default_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

/// Worker pool sizing and embedding rate budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the task buffer between the dispatch loop and the workers.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Aggregate embedding calls per minute across all workers.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Upper bound on the drain phase; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_secs: Option<u64>,

    /// Longer input messages are discarded without being buffered.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_workers() -> usize {
    4
}

fn default_buffer_capacity() -> usize {
    10
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            buffer_capacity: default_buffer_capacity(),
            requests_per_minute: default_requests_per_minute(),
            drain_timeout_secs: None,
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl PipelineConfig {
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_limit() -> u32 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
        }
    }
}

/// Passage explanations via Gemini `generateContent`.
///
/// The API key is shared with `embedding.api_key` (`GEMINI_API_KEY`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_explain_model")]
    pub model: String,

    #[serde(default = "default_explain_timeout")]
    pub timeout_secs: u64,

    /// Related records returned alongside an explanation.
    #[serde(default = "default_related_limit")]
    pub related_limit: u32,
}

fn default_explain_model() -> String {
    DEFAULT_EXPLAIN_MODEL.to_string()
}

fn default_explain_timeout() -> u64 {
    60
}

fn default_related_limit() -> u32 {
    5
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_explain_model(),
            timeout_secs: default_explain_timeout(),
            related_limit: default_related_limit(),
        }
    }
}

impl ExplainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
