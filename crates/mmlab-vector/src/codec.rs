//! Text codec for embedding vectors
//!
//! The column store has no vector type, so embeddings travel as a single
//! delimiter-separated text column. Components are written as plain
//! fixed-point decimals: downstream tokenizers split on the delimiter only
//! and reject exponent markers.
//!
//! Each component is rendered with the shortest decimal expansion that parses
//! back to the same `f64`, so `decode(encode(v)) == v` bit for bit (including
//! the sign of zero). Extreme magnitudes simply produce longer strings:
//! `1e-15` encodes as `0.000000000000001` and `1e15` as `1000000000000000`.

use std::fmt::Write;

use mmlab_core::{ColumnRow, Document, MmlabError, Result};

/// Default component delimiter
pub const DEFAULT_DELIMITER: char = ',';

/// Reject the first NaN or infinite component
pub fn check_finite(vector: &[f64]) -> Result<()> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MmlabError::InvalidValue {
            index,
            value: vector[index],
        }),
        None => Ok(()),
    }
}

/// Encoder/decoder for fixed-dimension vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCodec {
    dimension: usize,
    delimiter: char,
}

impl VectorCodec {
    /// Create a codec for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Use a different delimiter.
    ///
    /// The delimiter may not be a character that can occur inside an encoded
    /// component, or whitespace or brackets (which `decode` strips).
    pub fn with_delimiter(mut self, delimiter: char) -> Result<Self> {
        if delimiter.is_ascii_digit()
            || delimiter.is_whitespace()
            || matches!(delimiter, '.' | '-' | '+' | '[' | ']')
        {
            return Err(MmlabError::ConfigError(format!(
                "Delimiter {delimiter:?} can appear inside encoded vectors"
            )));
        }
        self.delimiter = delimiter;
        Ok(self)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Check length and finiteness without encoding
    pub fn validate(&self, vector: &[f64]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MmlabError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        check_finite(vector)
    }

    /// Encode a vector as delimiter-separated decimals
    pub fn encode(&self, vector: &[f64]) -> Result<String> {
        self.validate(vector)?;

        // Typical embedding components render in about 20 bytes
        let mut out = String::with_capacity(vector.len() * 21);
        for (i, value) in vector.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            // `Display` for f64 never emits an exponent
            let _ = write!(out, "{value}");
        }
        Ok(out)
    }

    /// Decode text produced by `encode`.
    ///
    /// Surrounding brackets (`[1,2,3]`) and whitespace around tokens are
    /// accepted. The component count is checked before any token is parsed.
    pub fn decode(&self, text: &str) -> Result<Vec<f64>> {
        let body = text.trim();
        let body = body
            .strip_prefix('[')
            .and_then(|b| b.strip_suffix(']'))
            .unwrap_or(body);

        let tokens: Vec<&str> = body.split(self.delimiter).collect();
        if tokens.len() != self.dimension {
            return Err(MmlabError::FormatError {
                expected: self.dimension,
                found: tokens.len(),
            });
        }

        tokens
            .into_iter()
            .enumerate()
            .map(|(index, token)| parse_component(index, token))
            .collect()
    }

    /// Encode a document into its persisted row form
    pub fn encode_row(&self, document: &Document) -> Result<ColumnRow> {
        let embedding = self.encode(&document.embedding)?;
        Ok(ColumnRow::new(
            document.key.clone(),
            document.width,
            document.height,
            embedding,
        ))
    }

    /// Decode a persisted row back into a document
    pub fn decode_row(&self, row: &ColumnRow) -> Result<Document> {
        let width = column_to_u32(&row.key, "width", row.width)?;
        let height = column_to_u32(&row.key, "height", row.height)?;
        let embedding = self.decode(&row.embedding)?;
        Ok(Document::new(row.key.clone(), width, height, embedding))
    }
}

fn parse_component(index: usize, token: &str) -> Result<f64> {
    let token = token.trim();
    let parse_error = || MmlabError::ParseError {
        index,
        token: token.to_string(),
    };

    if !is_plain_decimal(token) {
        return Err(parse_error());
    }

    let value: f64 = token.parse().map_err(|_| parse_error())?;
    if !value.is_finite() {
        // More integer digits than f64 can hold
        return Err(parse_error());
    }
    Ok(value)
}

/// `[+-]digits[.digits]`, with at least one digit overall
fn is_plain_decimal(token: &str) -> bool {
    let unsigned = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);

    let mut digits = 0usize;
    let mut seen_point = false;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    digits > 0
}

fn column_to_u32(key: &str, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        MmlabError::DatabaseError(format!("Row {key}: {column} {value} out of range"))
    })
}

// ============================================================================
// Tests
// ============================================================================
