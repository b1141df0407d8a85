//! In-memory keyed document store
//!
//! Documents are kept in a `BTreeMap` so iteration is always in ascending key
//! order, independent of insertion history.

use std::collections::BTreeMap;

use mmlab_core::{Document, MmlabError, Result, StoreStats};

use crate::codec::check_finite;

/// Keyed collection of documents sharing one embedding dimension
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: usize,
    documents: BTreeMap<String, Document>,
}

impl VectorStore {
    /// Create an empty store for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: BTreeMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Insert or replace the document under its key.
    ///
    /// Returns the replaced document, if any. Replacement is whole-document.
    /// Embeddings with NaN or infinite components are rejected.
    pub fn put(&mut self, document: Document) -> Result<Option<Document>> {
        if document.embedding.len() != self.dimension {
            return Err(MmlabError::DimensionMismatch {
                expected: self.dimension,
                actual: document.embedding.len(),
            });
        }
        check_finite(&document.embedding)?;
        Ok(self.documents.insert(document.key.clone(), document))
    }

    /// Get a document by key
    pub fn get(&self, key: &str) -> Result<&Document> {
        self.documents
            .get(key)
            .ok_or_else(|| MmlabError::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Document> {
        self.documents.remove(key)
    }

    /// Remove every document
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// `put` each document in sequence, stopping at the first failure.
    ///
    /// This loads in place with no rollback: on failure the store holds
    /// whatever was loaded before the failing document, on top of its previous
    /// contents, and `StoreInconsistency` is returned. Callers must run a full
    /// reload before trusting query results again. Use [`Self::replace_all`]
    /// for all-or-nothing semantics.
    pub fn bulk_load<I>(&mut self, documents: I) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut loaded = 0usize;
        for document in documents {
            let key = document.key.clone();
            if let Err(e) = self.put(document) {
                return Err(MmlabError::StoreInconsistency {
                    loaded,
                    reason: format!("{key}: {e}"),
                });
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Replace the whole contents, all-or-nothing.
    ///
    /// Loads into a shadow store and swaps it in only when every document was
    /// accepted. On failure the store is unchanged and the failing document's
    /// error is returned.
    pub fn replace_all<I>(&mut self, documents: I) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut shadow = Self::new(self.dimension);
        for document in documents {
            shadow.put(document)?;
        }
        let loaded = shadow.len();
        *self = shadow;
        Ok(loaded)
    }

    /// Keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Documents in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Document with the smallest key
    pub fn first(&self) -> Option<&Document> {
        self.documents.values().next()
    }

    /// Owned copies of every document, ordered by key
    pub fn snapshot_sorted(&self) -> Vec<Document> {
        self.documents.values().cloned().collect()
    }

    /// Count and pixel-dimension statistics
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total_documents: self.len(),
            dimension: self.dimension,
            ..Default::default()
        };
        if self.is_empty() {
            return stats;
        }

        let widths = self.documents.values().map(|d| d.width);
        let heights = self.documents.values().map(|d| d.height);

        stats.min_width = widths.clone().min();
        stats.max_width = widths.clone().max();
        stats.avg_width = Some(mean(widths));
        stats.min_height = heights.clone().min();
        stats.max_height = heights.clone().max();
        stats.avg_height = Some(mean(heights));
        stats
    }
}

fn mean(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(sum, count), v| {
        (sum + u64::from(v), count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str, embedding: Vec<f64>) -> Document {
        Document::new(key, 100, 200, embedding)
    }

    #[test]
    fn test_put_then_get() {
        let mut store = VectorStore::new(2);
        assert!(store.put(doc("a", vec![1.0, 0.0])).unwrap().is_none());

        let got = store.get("a").unwrap();
        assert_eq!(got.embedding, vec![1.0, 0.0]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_replaces_whole_document() {
        let mut store = VectorStore::new(2);
        store.put(Document::new("a", 1, 1, vec![1.0, 0.0])).unwrap();

        let d2 = Document::new("a", 5, 6, vec![0.0, 1.0]);
        let replaced = store.put(d2.clone()).unwrap();

        assert_eq!(replaced.unwrap().width, 1);
        assert_eq!(store.get("a").unwrap(), &d2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let store = VectorStore::new(2);
        assert!(matches!(
            store.get("missing").unwrap_err(),
            MmlabError::NotFound(key) if key == "missing"
        ));
    }

    #[test]
    fn test_put_wrong_dimension() {
        let mut store = VectorStore::new(3);
        let err = store.put(doc("a", vec![1.0])).unwrap_err();
        assert!(matches!(
            err,
            MmlabError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_rejects_non_finite() {
        let mut store = VectorStore::new(2);
        let err = store.put(doc("nan", vec![f64::NAN, 1.0])).unwrap_err();
        assert!(matches!(err, MmlabError::InvalidValue { index: 0, .. }));

        let err = store.put(doc("inf", vec![0.0, f64::NEG_INFINITY])).unwrap_err();
        assert!(matches!(err, MmlabError::InvalidValue { index: 1, .. }));
        assert!(store.is_empty());

        let mut loaded = VectorStore::new(2);
        loaded.put(doc("keep", vec![1.0, 0.0])).unwrap();
        let result = loaded.replace_all(vec![
            doc("a", vec![0.0, 1.0]),
            doc("b", vec![f64::INFINITY, 0.0]),
        ]);
        assert!(matches!(result, Err(MmlabError::InvalidValue { .. })));
        assert!(loaded.contains("keep"));
        assert!(!loaded.contains("a"));
    }

    #[test]
    fn test_clear_and_remove() {
        let mut store = VectorStore::new(1);
        store.put(doc("a", vec![1.0])).unwrap();
        store.put(doc("b", vec![2.0])).unwrap();

        assert_eq!(store.remove("a").unwrap().key, "a");
        assert!(!store.contains("a"));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_bulk_load_partial_failure_is_inconsistent() {
        let mut store = VectorStore::new(2);
        store.put(doc("old", vec![0.0, 1.0])).unwrap();

        let err = store
            .bulk_load(vec![
                doc("a", vec![1.0, 0.0]),
                doc("b", vec![1.0]),
                doc("c", vec![0.5, 0.5]),
            ])
            .unwrap_err();

        match err {
            MmlabError::StoreInconsistency { loaded, reason } => {
                assert_eq!(loaded, 1);
                assert!(reason.starts_with("b:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Mixed old/new state
        assert!(store.contains("old"));
        assert!(store.contains("a"));
        assert!(!store.contains("c"));
    }

    #[test]
    fn test_replace_all_keeps_previous_on_failure() {
        let mut store = VectorStore::new(2);
        store.put(doc("old", vec![0.0, 1.0])).unwrap();

        let err = store
            .replace_all(vec![doc("a", vec![1.0, 0.0]), doc("b", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, MmlabError::DimensionMismatch { .. }));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["old"]);

        let loaded = store
            .replace_all(vec![doc("b", vec![1.0, 0.0]), doc("a", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut store = VectorStore::new(1);
        for key in ["c", "a", "b"] {
            store.put(doc(key, vec![1.0])).unwrap();
        }
        assert_eq!(store.first().unwrap().key, "a");
        let keys: Vec<_> = store.snapshot_sorted().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stats() {
        let mut store = VectorStore::new(1);
        let empty = store.stats();
        assert_eq!(empty.total_documents, 0);
        assert_eq!(empty.dimension, 1);
        assert!(empty.avg_width.is_none());

        store.put(Document::new("a", 100, 300, vec![1.0])).unwrap();
        store.put(Document::new("b", 200, 100, vec![1.0])).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.min_width, Some(100));
        assert_eq!(stats.max_width, Some(200));
        assert_eq!(stats.avg_width, Some(150.0));
        assert_eq!(stats.min_height, Some(100));
        assert_eq!(stats.max_height, Some(300));
        assert_eq!(stats.avg_height, Some(200.0));
    }
}
