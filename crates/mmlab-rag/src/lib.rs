//! mmlab RAG - Retrieval over the in-memory document store
//!
//! [`RetrievalService`] owns the live [`VectorStore`] and is the entry point
//! for both the HTTP API and the CLI:
//! - queries embed the question text and rank stored documents by cosine
//!   similarity under a shared read lock
//! - reloads ingest into a shadow store and swap it in under the write lock,
//!   so readers never observe a partially loaded batch
//!
//! Answer generation happens downstream; this crate stops at ranked keys.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use mmlab_core::{
    AppConfig, ColumnStore, Document, MmlabError, QueryResult, RawRecord, Result,
    RetrievalConfig, StoreStats,
};
use mmlab_ingest::{IngestConfig, IngestReport, IngestionPipeline};
use mmlab_vector::{check_embedding, QueryEmbedder, SimilarityIndex, VectorCodec, VectorStore};

pub mod cache;
pub mod policy;

pub use cache::{CacheReport, EmbeddingCache};
pub use policy::{AlwaysRetrieve, KeywordPolicy, RetrievalPolicy};

/// Summary of the most recent successful reload or restore
#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    pub at: DateTime<Utc>,
    pub documents: usize,
    pub processed: usize,
    pub skipped: usize,
}

/// Query and reload front-end for the document store
pub struct RetrievalService {
    config: RetrievalConfig,
    index: SimilarityIndex,
    pipeline: Arc<IngestionPipeline>,
    store: RwLock<VectorStore>,
    /// Held for the whole of a reload, including persistence
    reload_lock: tokio::sync::Mutex<()>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    cache: EmbeddingCache,
    column_store: Option<Arc<dyn ColumnStore>>,
    last_reload: Mutex<Option<ReloadSummary>>,
}

impl RetrievalService {
    /// Create a service with an empty store.
    ///
    /// Without an embedder the service runs in demo mode: every query uses the
    /// embedding of the document with the smallest key.
    pub fn new(config: &AppConfig, embedder: Option<Arc<dyn QueryEmbedder>>) -> Result<Self> {
        let dimension = config.vector.dimension;
        if let Some(embedder) = &embedder {
            if embedder.dimension() != dimension {
                return Err(MmlabError::DimensionMismatch {
                    expected: dimension,
                    actual: embedder.dimension(),
                });
            }
        }

        let pipeline = IngestionPipeline::new(
            VectorCodec::new(dimension),
            IngestConfig::from(&config.ingestion),
        )?;

        Ok(Self {
            config: config.retrieval.clone(),
            index: SimilarityIndex::new(config.vector.tie_break),
            pipeline: Arc::new(pipeline),
            store: RwLock::new(VectorStore::new(dimension)),
            reload_lock: tokio::sync::Mutex::new(()),
            embedder,
            cache: EmbeddingCache::from_config(&config.embedding),
            column_store: None,
            last_reload: Mutex::new(None),
        })
    }

    /// Persist reloads to `column_store` and allow [`Self::restore`]
    pub fn with_column_store(mut self, column_store: Arc<dyn ColumnStore>) -> Self {
        self.column_store = Some(column_store);
        self
    }

    pub fn dimension(&self) -> usize {
        self.pipeline.codec().dimension()
    }

    pub fn default_top_k(&self) -> usize {
        self.config.top_k
    }

    pub fn is_demo_mode(&self) -> bool {
        self.embedder.is_none()
    }

    /// True once a reload or restore has succeeded
    pub fn is_ready(&self) -> bool {
        self.last_reload.lock().is_some()
    }

    pub fn last_reload(&self) -> Option<ReloadSummary> {
        self.last_reload.lock().clone()
    }

    pub fn cache_report(&self) -> CacheReport {
        self.cache.report()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// The `k` stored documents most similar to `query`
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        let Some(vector) = self.query_vector(query).await? else {
            tracing::debug!("Store is empty; nothing to retrieve");
            return Ok(Vec::new());
        };

        let store = self.store.read();
        let results =
            self.index
                .top_k_filtered(&store, &vector, k, self.config.similarity_threshold)?;

        tracing::debug!(
            "Query {:?} matched {:?}",
            query,
            results.iter().map(|r| r.key.as_str()).collect::<Vec<_>>()
        );
        Ok(results)
    }

    /// Retrieve only when `policy` says the query needs stored documents
    pub async fn answer_context(
        &self,
        query: &str,
        policy: &dyn RetrievalPolicy,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        if !policy.should_retrieve(query) {
            tracing::debug!("Policy skipped retrieval for {:?}", query);
            return Ok(Vec::new());
        }
        self.retrieve(query, k).await
    }

    async fn query_vector(&self, query: &str) -> Result<Option<Arc<Vec<f64>>>> {
        let Some(embedder) = &self.embedder else {
            let store = self.store.read();
            return Ok(store.first().map(|doc| Arc::new(doc.embedding.clone())));
        };

        if let Some(cached) = self.cache.get(query).await {
            return Ok(Some(cached));
        }

        let embedding = embedder.embed(query).await?;
        let vector = Arc::new(check_embedding(embedding, self.dimension())?);
        self.cache.put(query, Arc::clone(&vector)).await;
        Ok(Some(vector))
    }

    pub fn get(&self, key: &str) -> Result<Document> {
        self.store.read().get(key).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.read().stats()
    }

    /// Every document, ordered by key
    pub fn snapshot(&self) -> Vec<Document> {
        self.store.read().snapshot_sorted()
    }

    // ------------------------------------------------------------------------
    // Reloads
    // ------------------------------------------------------------------------

    /// Replace the store with `records`, skipping bad ones.
    ///
    /// Records are loaded into a shadow store which is swapped in only after
    /// the batch is complete (and persisted, when a column store is attached).
    /// If persistence fails the live store and the database are unchanged.
    pub async fn reload(&self, records: Vec<RawRecord>) -> Result<IngestReport> {
        let _guard = self.reload_lock.lock().await;
        tracing::info!("Reloading store from {} records", records.len());

        let pipeline = Arc::clone(&self.pipeline);
        let (shadow, report) =
            tokio::task::spawn_blocking(move || pipeline.load_into_shadow(&records))
                .await
                .map_err(|e| anyhow::anyhow!("Ingestion task failed: {e}"))?;

        if let Some(column_store) = &self.column_store {
            column_store.replace_all(&report.rows).await?;
        }

        self.swap_in(shadow, &report);
        Ok(report)
    }

    /// Replace the store with `records`, all-or-nothing.
    ///
    /// The first bad record aborts the reload with its error; the previous
    /// contents stay in place.
    pub async fn reload_strict(&self, records: Vec<RawRecord>) -> Result<IngestReport> {
        let _guard = self.reload_lock.lock().await;
        tracing::info!("Strict reload from {} records", records.len());

        let codec = *self.pipeline.codec();
        let (shadow, report) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut shadow = VectorStore::new(codec.dimension());
            let mut report = IngestReport::default();
            for record in records {
                let document =
                    Document::new(record.key, record.width, record.height, record.embedding);
                let row = codec.encode_row(&document)?;
                let previous = shadow.put(document)?;
                report.record_stored(row, previous.is_some());
            }
            Ok((shadow, report))
        })
        .await
        .map_err(|e| anyhow::anyhow!("Ingestion task failed: {e}"))??;

        if let Some(column_store) = &self.column_store {
            column_store.replace_all(&report.rows).await?;
        }

        self.swap_in(shadow, &report);
        Ok(report)
    }

    /// Rebuild the store from the attached column store.
    ///
    /// Rows that fail to decode are skipped and reported.
    pub async fn restore(&self) -> Result<IngestReport> {
        let column_store = self.column_store.as_ref().ok_or_else(|| {
            MmlabError::ConfigError("No column store attached to restore from".to_string())
        })?;

        let _guard = self.reload_lock.lock().await;
        let rows = column_store.load_all().await?;
        tracing::info!("Restoring store from {} persisted rows", rows.len());

        let codec = *self.pipeline.codec();
        let mut shadow = VectorStore::new(codec.dimension());
        let mut report = IngestReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            match codec.decode_row(&row).and_then(|doc| shadow.put(doc)) {
                Ok(previous) => report.record_stored(row, previous.is_some()),
                Err(e) => report.record_failure(index, &row.key, &e),
            }
        }

        self.swap_in(shadow, &report);
        Ok(report)
    }

    fn swap_in(&self, shadow: VectorStore, report: &IngestReport) {
        let documents = shadow.len();
        *self.store.write() = shadow;

        *self.last_reload.lock() = Some(ReloadSummary {
            at: Utc::now(),
            documents,
            processed: report.processed,
            skipped: report.skipped,
        });
        tracing::info!(
            "Store now holds {} documents ({} skipped)",
            documents,
            report.skipped
        );
    }
}
