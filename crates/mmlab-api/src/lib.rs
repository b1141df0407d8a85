//! mmlab API - HTTP retrieval server
//!
//! Exposes the retrieval service over REST with an OpenAPI document and
//! Swagger UI.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use mmlab_core::{AppConfig, PgColumnStore};
use mmlab_ingest::load_records;
use mmlab_rag::RetrievalService;
use mmlab_vector::create_query_embedder;

use crate::handlers::{documents, health, retrieve};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "mmlab API", description = "Multimodal document retrieval"),
    paths(
        health::health_check,
        health::readiness_check,
        retrieve::retrieve_handler,
        documents::get_document,
        documents::get_stats,
        documents::reload_handler,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::ReadinessResponse,
        retrieve::RetrieveRequest,
        retrieve::RetrieveResponse,
        retrieve::RetrievedDocument,
        documents::DocumentResponse,
        documents::StatsResponse,
        documents::ReloadRecord,
        documents::ReloadRequest,
        documents::ReloadFailure,
        documents::ReloadResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "retrieval", description = "Similarity search"),
        (name = "documents", description = "Stored documents and reloads")
    )
)]
pub struct ApiDoc;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let cors = if server.cors_enabled {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if server.cors_origins.is_empty() {
            Some(cors.allow_origin(Any))
        } else {
            let origins: Vec<HeaderValue> = server
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            Some(cors.allow_origin(origins))
        }
    } else {
        None
    };
    let timeout = Duration::from_secs(server.request_timeout_secs);

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Build the retrieval service from configuration and load its documents.
///
/// Documents come from the configured embeddings file when it exists,
/// otherwise from the column store when a database is configured. A failed
/// load is logged and the server starts unready.
pub async fn build_service(config: &AppConfig) -> anyhow::Result<Arc<RetrievalService>> {
    let embedder = create_query_embedder(&config.embedding, config.vector.dimension)?;
    let mut service = RetrievalService::new(config, embedder)?;

    if let Some(url) = &config.database.postgres_url {
        let store = PgColumnStore::new(
            url,
            &config.database.documents_table,
            config.database.pool_size,
        )
        .await?;
        store.init_schema().await?;
        service = service.with_column_store(Arc::new(store));
    }
    let has_column_store = config.database.postgres_url.is_some();

    let embeddings_file = &config.ingestion.embeddings_file;
    let loaded = if embeddings_file.exists() {
        match load_records(embeddings_file) {
            Ok(mut batch) => {
                let loaded = service.reload(batch.take_records()).await;
                loaded.map(|mut report| {
                    batch.complete(&mut report);
                    report
                })
            }
            Err(e) => Err(e),
        }
    } else if has_column_store {
        service.restore().await
    } else {
        tracing::warn!(
            "Embeddings file {} not found and no database configured",
            embeddings_file.display()
        );
        return Ok(Arc::new(service));
    };

    match loaded {
        Ok(report) => tracing::info!(
            "Loaded {} documents ({} skipped)",
            report.processed,
            report.skipped
        ),
        Err(e) => tracing::error!("Initial document load failed: {}", e),
    }
    Ok(Arc::new(service))
}

/// Run the HTTP server until it exits
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let service = build_service(&config).await?;
    let state = Arc::new(AppState::new(config, service));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("mmlab API server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
