//! Embedding batch files
//!
//! The upstream embedding job writes a JSON array of
//! `{key, width, height, embedding}` objects. JSON has no literal for
//! non-finite floats, so components may also be the strings `"NaN"`,
//! `"Infinity"` or `"-Infinity"`; they are read as-is and left for the
//! pipeline to reject. Any other string is a parse error for that record.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use mmlab_core::{Document, MmlabError, RawRecord, Result};

use crate::pipeline::IngestReport;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Component {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct SourceRecord {
    key: String,
    width: u32,
    height: u32,
    embedding: Vec<Component>,
}

impl SourceRecord {
    fn into_raw(self) -> Result<RawRecord> {
        let embedding = self
            .embedding
            .into_iter()
            .enumerate()
            .map(|(index, component)| match component {
                Component::Number(value) => Ok(value),
                Component::Text(text) => special_float(&text).ok_or(MmlabError::ParseError {
                    index,
                    token: text,
                }),
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(RawRecord::new(self.key, self.width, self.height, embedding))
    }
}

fn special_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" | "nan" => Some(f64::NAN),
        "Infinity" | "inf" => Some(f64::INFINITY),
        "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// A batch file split into readable records and entries that were rejected
/// while reading.
///
/// Each array entry is read on its own, so a single bad entry (unknown string
/// component, negative width, missing key) is rejected without losing the
/// rest of the file. Only a file that is not a JSON array at all is fatal.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<RawRecord>,
    positions: Vec<usize>,
    rejected: Vec<(usize, String, MmlabError)>,
}

impl RecordBatch {
    fn from_values(values: Vec<serde_json::Value>) -> Self {
        let mut batch = Self::default();
        for (position, value) in values.into_iter().enumerate() {
            let key = value
                .get("key")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();

            let record = serde_json::from_value::<SourceRecord>(value)
                .map_err(|e| MmlabError::Other(anyhow!("Invalid record: {e}")))
                .and_then(SourceRecord::into_raw);

            match record {
                Ok(record) => {
                    batch.records.push(record);
                    batch.positions.push(position);
                }
                Err(e) => batch.rejected.push((position, key, e)),
            }
        }
        batch
    }

    /// Move the readable records out, keeping what [`Self::complete`] needs
    pub fn take_records(&mut self) -> Vec<RawRecord> {
        std::mem::take(&mut self.records)
    }

    /// Entries rejected while reading
    pub fn rejected(&self) -> usize {
        self.rejected.len()
    }

    /// Errors of the rejected entries, with their file positions
    pub fn rejections(&self) -> impl Iterator<Item = (usize, &str, &MmlabError)> {
        self.rejected
            .iter()
            .map(|(position, key, error)| (*position, key.as_str(), error))
    }

    /// Fold the read failures into the report produced for `records`.
    ///
    /// Failure indices in `report` refer to positions in `records`; they are
    /// rewritten to file positions and merged in file order.
    pub fn complete(&self, report: &mut IngestReport) {
        for failure in &mut report.failures {
            if let Some(position) = self.positions.get(failure.index) {
                failure.index = *position;
            }
        }
        for (position, key, error) in &self.rejected {
            report.record_failure(*position, key, error);
        }
        report.failures.sort_by_key(|failure| failure.index);
    }
}

/// Parse a batch from JSON text
pub fn parse_records(json: &str) -> Result<RecordBatch> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).context("Invalid embeddings JSON")?;
    Ok(RecordBatch::from_values(values))
}

/// Read a batch file
pub fn load_records(path: impl AsRef<Path>) -> Result<RecordBatch> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open embeddings file {}", path.display()))?;

    let values: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid embeddings JSON in {}", path.display()))?;

    let batch = RecordBatch::from_values(values);
    tracing::info!(
        "Loaded {} records from {} ({} unreadable)",
        batch.records.len(),
        path.display(),
        batch.rejected()
    );
    Ok(batch)
}

/// Write documents in the batch file shape, ordered by key
pub fn export_records(path: impl AsRef<Path>, documents: &[Document]) -> Result<usize> {
    let path = path.as_ref();

    let mut records: Vec<&Document> = documents.iter().collect();
    records.sort_by(|a, b| a.key.cmp(&b.key));

    let file = File::create(path)
        .with_context(|| format!("Failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &records).context("Failed to serialize records")?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Exported {} records to {}", records.len(), path.display());
    Ok(records.len())
}
