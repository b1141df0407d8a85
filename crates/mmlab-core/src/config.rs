//! mmlab Configuration Management
//!
//! Handles configuration from environment variables and TOML files.
//! Defaults target 1024-dimensional multimodal embeddings with top-2
//! retrieval.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Vector dimension and ranking behaviour
    pub vector: VectorConfig,

    /// Query embedding provider
    pub embedding: EmbeddingConfig,

    /// Retrieval defaults
    pub retrieval: RetrievalConfig,

    /// Batch ingestion settings
    pub ingestion: IngestionConfig,

    /// Column-store persistence
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_env("API_PORT", port)?;
        }

        // Vector
        if let Ok(dimension) = std::env::var("EMBEDDING_DIMENSIONS") {
            config.vector.dimension = parse_env("EMBEDDING_DIMENSIONS", dimension)?;
        }

        // Embedding provider
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.parse()?;
        }
        if let Ok(url) = std::env::var("SERVERLESS_URL") {
            // Deployment templates ship a placeholder value; treat it as unset
            if !url.is_empty() && !url.starts_with("your-") {
                config.embedding.serverless_url = Some(url);
            }
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.embedding.ollama_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(secs) = std::env::var("EMBEDDING_TIMEOUT_SECS") {
            config.embedding.timeout_secs = parse_env("EMBEDDING_TIMEOUT_SECS", secs)?;
        }

        // Retrieval
        if let Ok(top_k) = std::env::var("MAX_SEARCH_RESULTS") {
            config.retrieval.top_k = parse_env("MAX_SEARCH_RESULTS", top_k)?;
        }
        if let Ok(threshold) = std::env::var("SIMILARITY_THRESHOLD") {
            config.retrieval.similarity_threshold =
                Some(parse_env("SIMILARITY_THRESHOLD", threshold)?);
        }

        // Ingestion
        if let Ok(workers) = std::env::var("INGEST_WORKERS") {
            config.ingestion.workers = parse_env("INGEST_WORKERS", workers)?;
        }
        if let Ok(path) = std::env::var("EMBEDDINGS_FILE") {
            config.ingestion.embeddings_file = PathBuf::from(path);
        }

        // Database
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.postgres_url = Some(url);
        }
        if let Ok(table) = std::env::var("DOCUMENTS_TABLE") {
            config.database.documents_table = table;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env.server.host != defaults.server.host {
            self.server.host = env.server.host;
        }
        if env.server.port != defaults.server.port {
            self.server.port = env.server.port;
        }
        if env.vector.dimension != defaults.vector.dimension {
            self.vector.dimension = env.vector.dimension;
        }
        if env.embedding.provider != defaults.embedding.provider {
            self.embedding.provider = env.embedding.provider;
        }
        if env.embedding.model != defaults.embedding.model {
            self.embedding.model = env.embedding.model;
        }
        if env.embedding.ollama_url != defaults.embedding.ollama_url {
            self.embedding.ollama_url = env.embedding.ollama_url;
        }
        if env.embedding.timeout_secs != defaults.embedding.timeout_secs {
            self.embedding.timeout_secs = env.embedding.timeout_secs;
        }
        if env.retrieval.top_k != defaults.retrieval.top_k {
            self.retrieval.top_k = env.retrieval.top_k;
        }
        if env.ingestion.workers != defaults.ingestion.workers {
            self.ingestion.workers = env.ingestion.workers;
        }
        if env.ingestion.embeddings_file != defaults.ingestion.embeddings_file {
            self.ingestion.embeddings_file = env.ingestion.embeddings_file;
        }
        if env.database.documents_table != defaults.database.documents_table {
            self.database.documents_table = env.database.documents_table;
        }
        if env.logging.level != defaults.logging.level {
            self.logging.level = env.logging.level;
        }
        if env.logging.json_format != defaults.logging.json_format {
            self.logging.json_format = env.logging.json_format;
        }

        // Always use env for endpoints and credentials when present
        if env.embedding.serverless_url.is_some() {
            self.embedding.serverless_url = env.embedding.serverless_url;
        }
        if env.retrieval.similarity_threshold.is_some() {
            self.retrieval.similarity_threshold = env.retrieval.similarity_threshold;
        }
        if env.database.postgres_url.is_some() {
            self.database.postgres_url = env.database.postgres_url;
        }

        Ok(self)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vector.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "vector.dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retrieval.top_k".to_string(),
                value: "0".to_string(),
            });
        }
        if self.ingestion.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ingestion.workers".to_string(),
                value: "0".to_string(),
            });
        }
        if let Some(threshold) = self.retrieval.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    key: "retrieval.similarity_threshold".to_string(),
                    value: threshold.to_string(),
                });
            }
        }
        if self.embedding.provider == EmbeddingProvider::Serverless
            && self.embedding.serverless_url.is_none()
        {
            return Err(ConfigError::MissingRequired("SERVERLESS_URL".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    let parsed: Result<T, _> = value.trim().parse();
    parsed.map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 60,
            cors_enabled: true,
            cors_origins: vec![],
        }
    }
}

/// Vector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Embedding dimension D (must match the embedding model)
    pub dimension: usize,

    /// Ordering applied to candidates with equal scores
    pub tie_break: TieBreak,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: 1024, // voyage-multimodal-3
            tie_break: TieBreak::KeyAscending,
        }
    }
}

/// Deterministic ordering between equal-score candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    KeyAscending,
    KeyDescending,
}

/// Query embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider used to embed query text
    pub provider: EmbeddingProvider,

    /// Serverless endpoint URL
    pub serverless_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Embedding model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum cached query embeddings
    pub cache_capacity: u64,

    /// Query embedding cache TTL in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Demo,
            serverless_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "voyage-multimodal-3".to_string(),
            timeout_secs: 30,
            cache_capacity: 1_000,
            cache_ttl_secs: 600,
        }
    }
}

/// Supported query embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// HTTP endpoint taking `{"task": "get_embedding", ...}`
    Serverless,
    Ollama,
    /// No provider: queries reuse a stored embedding
    Demo,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serverless" => Ok(Self::Serverless),
            "ollama" => Ok(Self::Ollama),
            "demo" | "none" => Ok(Self::Demo),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of results
    pub top_k: usize,

    /// Candidates scoring below this are dropped
    pub similarity_threshold: Option<f64>,

    /// Queries containing any of these phrases skip retrieval
    pub skip_phrases: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            similarity_threshold: None,
            skip_phrases: vec!["explain this image".to_string()],
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Worker threads used to validate and encode records
    pub workers: usize,

    /// Pre-computed embeddings batch file
    pub embeddings_file: PathBuf,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            embeddings_file: PathBuf::from("data/embeddings.json"),
        }
    }
}

/// Column-store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (persistence disabled when unset)
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,

    /// Table holding one row per document
    pub documents_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            pool_size: 5,
            documents_table: "multimodal_documents".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
