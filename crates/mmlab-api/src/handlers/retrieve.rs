//! Retrieval handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use mmlab_rag::RetrievalPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Retrieve request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct RetrieveRequest {
    /// Question text
    #[schema(example = "How much did training the model cost?")]
    pub query: String,

    /// Number of documents to return (server default when absent)
    #[schema(example = 2)]
    pub top_k: Option<usize>,
}

/// A ranked document
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrievedDocument {
    #[schema(example = "data/images/3.png")]
    pub key: String,

    /// Cosine similarity in [-1, 1]
    #[schema(example = 0.91)]
    pub score: f64,
}

/// Retrieve response body
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrieveResponse {
    pub results: Vec<RetrievedDocument>,

    /// False when the query was answered without retrieval
    pub retrieved: bool,

    #[schema(example = 12)]
    pub processing_time_ms: u64,
}

/// Rank stored documents against a question
#[utoipa::path(
    post,
    path = "/api/v1/retrieve",
    tag = "retrieval",
    request_body = RetrieveRequest,
    responses(
        (status = 200, description = "Ranked documents", body = RetrieveResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Embedding provider failed", body = crate::error::ApiError)
    )
)]
pub async fn retrieve_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrieveRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let start = std::time::Instant::now();

    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }
    let top_k = req.top_k.unwrap_or(state.service.default_top_k());
    if top_k == 0 {
        return Err(AppError::BadRequest("top_k must be at least 1".to_string()));
    }

    let retrieved = state.policy.should_retrieve(&req.query);
    let results = state
        .service
        .answer_context(&req.query, &state.policy, top_k)
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Retrieved {} documents in {} ms",
        results.len(),
        processing_time_ms
    );

    Ok(Json(RetrieveResponse {
        results: results
            .into_iter()
            .map(|r| RetrievedDocument {
                key: r.key,
                score: r.score,
            })
            .collect(),
        retrieved,
        processing_time_ms,
    }))
}
