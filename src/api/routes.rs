//! API route definitions
//!
//! - POST /api/v1/analyze      - raw image upload
//! - POST /api/v1/analyze/url  - image by URL or dropped HTML
//! - GET  /api/v1/analysis     - current analysis state
//! - GET  /api/v1/status       - in-progress signal and backend info
//! - GET  /health              - liveness

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

/// Create all versioned API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze_image))
        .route("/analyze/url", post(handlers::analyze_url))
        .route("/analysis", get(handlers::get_analysis))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

/// Health endpoint at root level
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
