//! mmlab Ingest - Embedding batches into the vector store
//!
//! Reads batches produced by the upstream embedding job and loads them with
//! continue-on-error semantics, keeping the encoded rows for persistence.

pub mod loader;
pub mod pipeline;

pub use loader::{export_records, load_records, parse_records, RecordBatch};
pub use pipeline::{IngestConfig, IngestFailure, IngestReport, IngestionPipeline};
