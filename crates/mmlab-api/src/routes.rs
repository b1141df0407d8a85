//! API route definitions

use crate::handlers::{documents, retrieve};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/retrieve", post(retrieve::retrieve_handler))
        .route("/reload", post(documents::reload_handler))
        // Keys are paths like data/images/3.png
        .route("/documents/*key", get(documents::get_document))
        .route("/stats", get(documents::get_stats))
}
