//! Continue-on-error ingestion
//!
//! Records are validated and encoded on a bounded worker pool, then applied to
//! the store one at a time in input order. A bad record is reported and
//! skipped; it never aborts the batch.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use mmlab_core::{ColumnRow, Document, ErrorKind, IngestionConfig, MmlabError, RawRecord, Result};
use mmlab_vector::{VectorCodec, VectorStore};

/// Worker pool settings
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Encoding threads
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl From<&IngestionConfig> for IngestConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            workers: config.workers,
        }
    }
}

/// One skipped record
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// Position in the input batch
    pub index: usize,
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of loading a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Records stored
    pub processed: usize,

    /// Records rejected
    pub skipped: usize,

    /// Stored records that replaced an existing key
    pub replaced: usize,

    pub errors_by_kind: BTreeMap<ErrorKind, usize>,

    pub failures: Vec<IngestFailure>,

    /// Encoded rows of the stored records, in input order
    #[serde(skip)]
    pub rows: Vec<ColumnRow>,
}

impl IngestReport {
    /// No record was skipped
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Count a stored record and keep its encoded row
    pub fn record_stored(&mut self, row: ColumnRow, replaced: bool) {
        self.processed += 1;
        if replaced {
            self.replaced += 1;
        }
        self.rows.push(row);
    }

    /// Count a skipped record
    pub fn record_failure(&mut self, index: usize, key: &str, error: &MmlabError) {
        tracing::warn!("Skipping record {} ({}): {}", index, key, error);

        let kind = error.kind();
        self.skipped += 1;
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;
        self.failures.push(IngestFailure {
            index,
            key: key.to_string(),
            kind,
            message: error.to_string(),
        });
    }
}

/// Encodes raw records and loads them into a [`VectorStore`]
pub struct IngestionPipeline {
    codec: VectorCodec,
    pool: rayon::ThreadPool,
}

impl IngestionPipeline {
    pub fn new(codec: VectorCodec, config: IngestConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("mmlab-ingest-{i}"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build ingestion pool: {e}"))?;

        Ok(Self { codec, pool })
    }

    pub fn codec(&self) -> &VectorCodec {
        &self.codec
    }

    /// Load `records` into `store`, skipping and reporting bad ones.
    ///
    /// Duplicate keys within the batch resolve to the last record.
    pub fn load(&self, store: &mut VectorStore, records: &[RawRecord]) -> IngestReport {
        let prepared: Vec<Result<(Document, ColumnRow)>> = self
            .pool
            .install(|| records.par_iter().map(|r| self.prepare(r)).collect());

        let mut report = IngestReport::default();
        for (index, (record, outcome)) in records.iter().zip(prepared).enumerate() {
            let stored = outcome.and_then(|(document, row)| {
                store.put(document).map(|previous| (previous, row))
            });

            match stored {
                Ok((previous, row)) => report.record_stored(row, previous.is_some()),
                Err(e) => report.record_failure(index, &record.key, &e),
            }
        }

        tracing::info!(
            "Ingested {} records ({} skipped, {} replaced)",
            report.processed,
            report.skipped,
            report.replaced
        );
        report
    }

    /// Load `records` into a fresh store, leaving any live store untouched
    pub fn load_into_shadow(&self, records: &[RawRecord]) -> (VectorStore, IngestReport) {
        let mut shadow = VectorStore::new(self.codec.dimension());
        let report = self.load(&mut shadow, records);
        (shadow, report)
    }

    fn prepare(&self, record: &RawRecord) -> Result<(Document, ColumnRow)> {
        let document = Document::new(
            record.key.clone(),
            record.width,
            record.height,
            record.embedding.clone(),
        );
        let row = self.codec.encode_row(&document)?;
        Ok((document, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(dimension: usize) -> IngestionPipeline {
        IngestionPipeline::new(VectorCodec::new(dimension), IngestConfig { workers: 2 }).unwrap()
    }

    fn raw(key: &str, embedding: Vec<f64>) -> RawRecord {
        RawRecord::new(key, 640, 480, embedding)
    }

    #[test]
    fn test_continue_on_error() {
        let records = vec![
            raw("r1", vec![1.0, 0.0, 0.0]),
            raw("r2", vec![0.0, 1.0, 0.0]),
            raw("r3", vec![0.0, f64::NAN, 0.0]),
            raw("r4", vec![0.0, 0.0, 1.0]),
            raw("r5", vec![0.5, 0.5, 0.0]),
        ];

        let mut store = VectorStore::new(3);
        let report = pipeline(3).load(&mut store, &records);

        assert_eq!(report.processed, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors_by_kind.get(&ErrorKind::InvalidValue), Some(&1));
        assert_eq!(report.failures[0].key, "r3");
        assert_eq!(report.failures[0].index, 2);
        assert!(!report.is_clean());

        assert_eq!(store.len(), 4);
        assert!(!store.contains("r3"));
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.rows[2].key, "r4");
        assert_eq!(report.rows[2].embedding, "0,0,1");
    }

    #[test]
    fn test_mixed_failure_kinds() {
        let records = vec![
            raw("short", vec![1.0]),
            raw("inf", vec![f64::INFINITY, 0.0]),
            raw("ok", vec![1.0, 2.0]),
        ];

        let (store, report) = pipeline(2).load_into_shadow(&records);
        assert_eq!(store.len(), 1);
        assert_eq!(report.errors_by_kind.len(), 2);
        assert_eq!(
            report.errors_by_kind.get(&ErrorKind::DimensionMismatch),
            Some(&1)
        );
        assert_eq!(report.errors_by_kind.get(&ErrorKind::InvalidValue), Some(&1));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let records = vec![raw("k", vec![1.0, 0.0]), raw("k", vec![0.0, 1.0])];
        let (store, report) = pipeline(2).load_into_shadow(&records);

        assert!(report.is_clean());
        assert_eq!(report.processed, 2);
        assert_eq!(report.replaced, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").unwrap().embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_input_order_preserved_across_workers() {
        let records: Vec<RawRecord> = (0..200)
            .map(|i| raw(&format!("doc-{i:03}"), vec![i as f64, 1.0]))
            .collect();

        let (_, report) = pipeline(2).load_into_shadow(&records);
        let keys: Vec<_> = report.rows.iter().map(|r| r.key.clone()).collect();
        let expected: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_empty_batch() {
        let (store, report) = pipeline(3).load_into_shadow(&[]);
        assert!(store.is_empty());
        assert!(report.is_clean());
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn test_report_serialization_skips_rows() {
        let (_, report) = pipeline(1).load_into_shadow(&[raw("a", vec![f64::NAN])]);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("rows").is_none());
        assert_eq!(json["errors_by_kind"]["invalid_value"], 1);
        assert_eq!(json["failures"][0]["kind"], "invalid_value");
    }
}
