//! Document, statistics, and reload handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use mmlab_core::{RawRecord, StoreStats};
use mmlab_ingest::IngestReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Stored document metadata (the embedding itself is not returned)
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(example = "data/images/3.png")]
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub dimension: usize,
}

/// Get a stored document by key
#[utoipa::path(
    get,
    path = "/api/v1/documents/{key}",
    tag = "documents",
    params(("key" = String, Path, description = "Document key")),
    responses(
        (status = 200, description = "Document found", body = DocumentResponse),
        (status = 404, description = "No such document", body = crate::error::ApiError)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.service.get(&key)?;
    Ok(Json(DocumentResponse {
        dimension: doc.dimension(),
        key: doc.key,
        width: doc.width,
        height: doc.height,
    }))
}

/// Store statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_documents: usize,
    pub dimension: usize,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub avg_width: Option<f64>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub avg_height: Option<f64>,
    pub requests: u64,
}

impl StatsResponse {
    fn new(stats: StoreStats, requests: u64) -> Self {
        Self {
            total_documents: stats.total_documents,
            dimension: stats.dimension,
            min_width: stats.min_width,
            max_width: stats.max_width,
            avg_width: stats.avg_width,
            min_height: stats.min_height,
            max_height: stats.max_height,
            avg_height: stats.avg_height,
            requests,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "documents",
    responses(
        (status = 200, description = "Store statistics", body = StatsResponse)
    )
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatsResponse::new(
        state.service.stats(),
        state.get_request_count(),
    ))
}

/// Record supplied by the embedding job
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReloadRecord {
    #[schema(example = "data/images/1.png")]
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub embedding: Vec<f64>,
}

/// Reload request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReloadRequest {
    pub records: Vec<ReloadRecord>,

    /// Reject the whole batch on the first bad record
    #[serde(default)]
    pub strict: bool,
}

/// A skipped record
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadFailure {
    pub index: usize,
    pub key: String,
    #[schema(example = "invalid_value")]
    pub kind: String,
    pub message: String,
}

/// Reload outcome
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    pub processed: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub failures: Vec<ReloadFailure>,
    pub documents: usize,
}

impl ReloadResponse {
    fn new(report: IngestReport, documents: usize) -> Self {
        Self {
            processed: report.processed,
            skipped: report.skipped,
            replaced: report.replaced,
            errors_by_kind: report
                .errors_by_kind
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            failures: report
                .failures
                .into_iter()
                .map(|f| ReloadFailure {
                    index: f.index,
                    key: f.key,
                    kind: f.kind.to_string(),
                    message: f.message,
                })
                .collect(),
            documents,
        }
    }
}

/// Replace the document store with a new batch
#[utoipa::path(
    post,
    path = "/api/v1/reload",
    tag = "documents",
    request_body = ReloadRequest,
    responses(
        (status = 200, description = "Store reloaded", body = ReloadResponse),
        (status = 400, description = "Strict reload rejected a record", body = crate::error::ApiError),
        (status = 500, description = "Persistence failed", body = crate::error::ApiError)
    )
)]
pub async fn reload_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let records: Vec<RawRecord> = req
        .records
        .into_iter()
        .map(|r| RawRecord::new(r.key, r.width, r.height, r.embedding))
        .collect();

    let report = if req.strict {
        state.service.reload_strict(records).await?
    } else {
        state.service.reload(records).await?
    };

    let documents = state.service.stats().total_documents;
    Ok(Json(ReloadResponse::new(report, documents)))
}
