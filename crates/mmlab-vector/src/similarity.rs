//! Cosine similarity ranking
//!
//! Brute-force scan: every query computes the dot product and norms against
//! every stored document, O(N·D). Fine for corpora of a few thousand
//! documents; there is no pruning or index structure.

use std::cmp::Ordering;

use mmlab_core::{MmlabError, QueryResult, Result, TieBreak};

use crate::codec::check_finite;
use crate::store::VectorStore;

/// Cosine similarity of two equal-length vectors.
///
/// A zero-norm (all-zero) vector has no direction, so its similarity to
/// anything is defined as 0.0. Components are rescaled by each vector's
/// largest magnitude before accumulating, which keeps squares of very large or
/// very small components from overflowing or underflowing.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let query = ScaledQuery::new(a);
    query.score(b)
}

/// Largest absolute component
fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}

/// Query vector with its scale and norm computed once per search
struct ScaledQuery<'a> {
    vector: &'a [f64],
    scale: f64,
    norm: f64,
}

impl<'a> ScaledQuery<'a> {
    fn new(vector: &'a [f64]) -> Self {
        let scale = max_abs(vector);
        let norm = if scale == 0.0 {
            0.0
        } else {
            vector
                .iter()
                .map(|x| {
                    let x = x / scale;
                    x * x
                })
                .sum::<f64>()
                .sqrt()
        };
        Self {
            vector,
            scale,
            norm,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.norm == 0.0
    }

    fn score(&self, other: &[f64]) -> f64 {
        let other_scale = max_abs(other);
        if self.is_degenerate() || other_scale == 0.0 {
            return 0.0;
        }

        let (dot, other_sq) =
            self.vector
                .iter()
                .zip(other)
                .fold((0.0f64, 0.0f64), |(dot, sq), (q, o)| {
                    let q = q / self.scale;
                    let o = o / other_scale;
                    (dot + q * o, sq + o * o)
                });

        (dot / (self.norm * other_sq.sqrt())).clamp(-1.0, 1.0)
    }
}

/// Top-k cosine ranking over a [`VectorStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityIndex {
    tie_break: TieBreak,
}

impl SimilarityIndex {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// The `k` most similar documents, by descending score.
    ///
    /// Equal scores are ordered by key according to the configured
    /// [`TieBreak`]. Returns every document when `k` exceeds the store size,
    /// and an empty list for an empty store or `k == 0`.
    pub fn top_k(&self, store: &VectorStore, query: &[f64], k: usize) -> Result<Vec<QueryResult>> {
        self.top_k_filtered(store, query, k, None)
    }

    /// Like [`Self::top_k`], dropping candidates scoring below `min_score`
    pub fn top_k_filtered(
        &self,
        store: &VectorStore,
        query: &[f64],
        k: usize,
        min_score: Option<f64>,
    ) -> Result<Vec<QueryResult>> {
        if store.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != store.dimension() {
            return Err(MmlabError::DimensionMismatch {
                expected: store.dimension(),
                actual: query.len(),
            });
        }
        check_finite(query)?;

        let query = ScaledQuery::new(query);
        if query.is_degenerate() {
            tracing::warn!("Zero-norm query vector: every candidate scores 0");
        }

        let mut scored: Vec<(f64, &str)> = store
            .iter()
            .map(|doc| (query.score(&doc.embedding), doc.key.as_str()))
            .filter(|(score, _)| min_score.map_or(true, |min| *score >= min))
            .collect();

        let compare = |a: &(f64, &str), b: &(f64, &str)| self.compare(a, b);

        // Partition the best k to the front before sorting just those
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare);
            scored.truncate(k);
        }
        scored.sort_unstable_by(compare);

        tracing::debug!(
            "Similarity scan over {} documents returned {} results",
            store.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(score, key)| QueryResult::new(key, score))
            .collect())
    }

    fn compare(&self, a: &(f64, &str), b: &(f64, &str)) -> Ordering {
        b.0.total_cmp(&a.0).then_with(|| match self.tie_break {
            TieBreak::KeyAscending => a.1.cmp(b.1),
            TieBreak::KeyDescending => b.1.cmp(a.1),
        })
    }
}
