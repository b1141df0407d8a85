//! API Integration Tests
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! service runs in demo mode so no embedding endpoint is needed.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use mmlab_api::{create_router, state::AppState};
use mmlab_core::{AppConfig, RawRecord, Result};
use mmlab_rag::RetrievalService;
use mmlab_vector::QueryEmbedder;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.vector.dimension = 3;
    config.ingestion.workers = 2;
    config
}

fn abc() -> Vec<RawRecord> {
    vec![
        RawRecord::new("data/images/A.png", 100, 200, vec![1.0, 0.0, 0.0]),
        RawRecord::new("data/images/B.png", 300, 400, vec![0.0, 1.0, 0.0]),
        RawRecord::new("data/images/C.png", 500, 600, vec![0.9, 0.1, 0.0]),
    ]
}

async fn app(records: Option<Vec<RawRecord>>) -> Router {
    let config = test_config();
    let service = Arc::new(RetrievalService::new(&config, None).unwrap());
    if let Some(records) = records {
        service.reload(records).await.unwrap();
    }
    create_router(Arc::new(AppState::new(config, service)))
}

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let response = app(None)
        .await
        .oneshot(create_json_request("GET", "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_not_ready_before_load() {
    let response = app(None)
        .await
        .oneshot(create_json_request("GET", "/ready", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["ready"], false);
    assert_eq!(json["demo_mode"], true);
}

#[tokio::test]
async fn test_ready_after_load() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request("GET", "/ready", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["documents"], 3);
    assert!(json["last_reload"].is_string());
}

// =============================================================================
// Retrieval Tests
// =============================================================================

#[tokio::test]
async fn test_retrieve_ranks_documents() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "What does the first figure show?", "top_k": 2 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["key"], "data/images/A.png");
    assert_eq!(results[1]["key"], "data/images/C.png");
    assert_eq!(json["retrieved"], true);
    assert!(json["processing_time_ms"].is_u64());
}

#[tokio::test]
async fn test_retrieve_uses_default_top_k() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "anything" })),
        ))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_retrieve_skipped_by_policy() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "Explain this image" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["retrieved"], false);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_retrieve_empty_query_rejected() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "   " })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

/// Embedder that answers with too few components
struct ShortEmbedder;

#[async_trait]
impl QueryEmbedder for ShortEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>> {
        Ok(vec![1.0])
    }

    fn dimension(&self) -> usize {
        3
    }
}

#[tokio::test]
async fn test_retrieve_bad_embedding_is_bad_gateway() {
    let config = test_config();
    let service = Arc::new(RetrievalService::new(&config, Some(Arc::new(ShortEmbedder))).unwrap());
    service.reload(abc()).await.unwrap();
    let app = create_router(Arc::new(AppState::new(config, service)));

    let response = app
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "What does the first figure show?" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_retrieve_empty_store() {
    let response = app(None)
        .await
        .oneshot(create_json_request(
            "POST",
            "/api/v1/retrieve",
            Some(json!({ "query": "anything", "top_k": 5 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["results"].as_array().unwrap().is_empty());
}

// =============================================================================
// Document Tests
// =============================================================================

#[tokio::test]
async fn test_get_document_with_path_key() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request(
            "GET",
            "/api/v1/documents/data/images/B.png",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["key"], "data/images/B.png");
    assert_eq!(json["width"], 300);
    assert_eq!(json["dimension"], 3);
}

#[tokio::test]
async fn test_get_missing_document() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request("GET", "/api/v1/documents/nope.png", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_stats() {
    let response = app(Some(abc()))
        .await
        .oneshot(create_json_request("GET", "/api/v1/stats", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_documents"], 3);
    assert_eq!(json["min_width"], 100);
    assert_eq!(json["max_height"], 600);
    assert_eq!(json["avg_width"], 300.0);
}

// =============================================================================
// Reload Tests
// =============================================================================

#[tokio::test]
async fn test_reload_reports_skipped_records() {
    let app = app(Some(abc())).await;

    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/reload",
            Some(json!({
                "records": [
                    { "key": "x", "width": 1, "height": 1, "embedding": [0.0, 0.0, 1.0] },
                    { "key": "y", "width": 1, "height": 1, "embedding": [1.0, 0.0] }
                ]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["processed"], 1);
    assert_eq!(json["skipped"], 1);
    assert_eq!(json["errors_by_kind"]["dimension_mismatch"], 1);
    assert_eq!(json["failures"][0]["key"], "y");
    assert_eq!(json["documents"], 1);

    let response = app
        .oneshot(create_json_request("GET", "/api/v1/documents/data/images/A.png", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_strict_reload_rejects_batch() {
    let app = app(Some(abc())).await;

    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/reload",
            Some(json!({
                "strict": true,
                "records": [
                    { "key": "x", "width": 1, "height": 1, "embedding": [0.0, 0.0, 1.0] },
                    { "key": "y", "width": 1, "height": 1, "embedding": [1.0, 0.0] }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(create_json_request("GET", "/api/v1/stats", None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total_documents"], 3);
}

#[tokio::test]
async fn test_openapi_document() {
    let response = app(None)
        .await
        .oneshot(create_json_request("GET", "/api-docs/openapi.json", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/api/v1/retrieve"].is_object());
}
