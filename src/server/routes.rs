// ============================================================
// Layer 1 — HTTP Routes
// ============================================================
// API routes carry the shared state; static routes serve the
// front-end page and its asset directories.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};

use super::handlers::{health, predict, AppState};
use crate::server::config::ServerConfig;

/// Prediction API
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Scan classification
        .route("/predict", post(predict))
}

/// Web front-end: index page plus two static directories
pub fn static_routes(config: &ServerConfig) -> Router<Arc<AppState>> {
    Router::new()
        .route_service("/", ServeFile::new(&config.index_file))
        .nest_service("/assets", ServeDir::new(&config.assets_dir))
        .nest_service("/static", ServeDir::new(&config.static_dir))
}
