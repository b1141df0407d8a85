//! mmlab Core - Records, errors, and shared configuration
//!
//! This crate defines the pieces every other mmlab crate agrees on:
//! - The error taxonomy for encoding, storage, and retrieval
//! - Document and query result records
//! - Configuration management
//! - Column-store persistence (PostgreSQL text columns)
//! - Logging initialisation

pub mod column_store;
pub mod config;
pub mod logging;

pub use column_store::{ColumnRow, ColumnStore, MemoryColumnStore, PgColumnStore};
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, EmbeddingConfig, EmbeddingProvider, IngestionConfig,
    LoggingConfig, RetrievalConfig, ServerConfig, TieBreak, VectorConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Error taxonomy shared by the codec, store, index, and services
#[derive(Error, Debug)]
pub enum MmlabError {
    #[error("Malformed vector text: expected {expected} components, found {found}")]
    FormatError { expected: usize, found: usize },

    #[error("Invalid decimal token at index {index}: {token:?}")]
    ParseError { index: usize, token: String },

    #[error("Non-finite component at index {index}: {value}")]
    InvalidValue { index: usize, value: f64 },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Embedding provider error: {0}")]
    ProviderError(String),

    #[error("Store left inconsistent after loading {loaded} documents: {reason}")]
    StoreInconsistency { loaded: usize, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MmlabError {
    /// Discriminant used for grouping errors in reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FormatError { .. } => ErrorKind::Format,
            Self::ParseError { .. } => ErrorKind::Parse,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ProviderError(_) => ErrorKind::Provider,
            Self::StoreInconsistency { .. } => ErrorKind::StoreInconsistency,
            Self::DatabaseError(_) => ErrorKind::Database,
            Self::ConfigError(_) => ErrorKind::Config,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<ConfigError> for MmlabError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MmlabError>;

/// Error category, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    Parse,
    InvalidValue,
    DimensionMismatch,
    NotFound,
    Provider,
    StoreInconsistency,
    Database,
    Config,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Format => "format",
            Self::Parse => "parse",
            Self::InvalidValue => "invalid_value",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::NotFound => "not_found",
            Self::Provider => "provider",
            Self::StoreInconsistency => "store_inconsistency",
            Self::Database => "database",
            Self::Config => "config",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// A stored document: identifying key, pixel dimensions, and embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key within a store (e.g. "data/images/3.png")
    pub key: String,

    /// Pixel width of the source page or image
    pub width: u32,

    /// Pixel height of the source page or image
    pub height: u32,

    /// Embedding vector; length equals the store dimension
    pub embedding: Vec<f64>,
}

impl Document {
    /// Create a new document
    pub fn new(key: impl Into<String>, width: u32, height: u32, embedding: Vec<f64>) -> Self {
        Self {
            key: key.into(),
            width,
            height,
            embedding,
        }
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A record as produced upstream by the external embedding model.
///
/// Components are not yet validated: they may have the wrong length or
/// contain non-finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub embedding: Vec<f64>,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, width: u32, height: u32, embedding: Vec<f64>) -> Self {
        Self {
            key: key.into(),
            width,
            height,
            embedding,
        }
    }
}

impl From<Document> for RawRecord {
    fn from(doc: Document) -> Self {
        Self {
            key: doc.key,
            width: doc.width,
            height: doc.height,
            embedding: doc.embedding,
        }
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// A ranked match returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Key of the matched document
    pub key: String,

    /// Cosine similarity in [-1, 1] (higher is better)
    pub score: f64,
}

impl QueryResult {
    pub fn new(key: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            score,
        }
    }
}

/// Aggregate statistics over the documents in a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored documents
    pub total_documents: usize,

    /// Embedding dimension of the store
    pub dimension: usize,

    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub avg_width: Option<f64>,

    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub avg_height: Option<f64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = MmlabError::InvalidValue {
            index: 2,
            value: f64::NAN,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let err = MmlabError::DimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 4");

        let err: MmlabError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::DimensionMismatch).unwrap();
        assert_eq!(json, "\"dimension_mismatch\"");
        assert_eq!(ErrorKind::InvalidValue.to_string(), "invalid_value");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: MmlabError = ConfigError::MissingRequired("DATABASE_URL".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_raw_record_from_document() {
        let doc = Document::new("data/images/1.png", 1800, 2400, vec![0.5, -0.25]);
        assert_eq!(doc.dimension(), 2);

        let raw = RawRecord::from(doc.clone());
        assert_eq!(raw.key, doc.key);
        assert_eq!(raw.embedding, doc.embedding);
    }
}
