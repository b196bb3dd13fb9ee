//! API route handlers
//!
//! Submission endpoints feed images into the shared [`AnalysisSession`];
//! read endpoints expose its state and the in-progress signal.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::ingest;
use crate::pipeline::{AnalysisSession, AnalysisState, InvocationId, PipelineStats, Submission};
use crate::types::AnalysisOutcome;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub session: AnalysisSession,
    /// Client used to fetch images by URL
    pub http: reqwest::Client,
    pub max_image_bytes: usize,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(session: AnalysisSession, http: reqwest::Client, max_image_bytes: usize) -> Self {
        Self {
            session,
            http,
            max_image_bytes,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Submission Endpoints
// ============================================================================

/// Body of `POST /api/v1/analyze/url`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeUrlRequest {
    pub url: Option<String>,
    /// Dropped HTML fragment; the first `<img src>` is used.
    pub html: Option<String>,
}

/// Result of a submission that was accepted.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub status: &'static str,
    pub invocation: InvocationId,
    /// Display form: the final stage's raw text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AnalysisOutcome>,
    /// Current session state, for duplicate and stale submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AnalysisState>,
}

/// POST /api/v1/analyze - Analyze a raw image body
pub async fn analyze_image(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return submission_response(&state, state.session.submit(None).await);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let image = match ingest::from_bytes(body.to_vec(), content_type) {
        Ok(image) => image,
        Err(e) => return ApiErrorResponse::from_pipeline(&e),
    };

    debug!(bytes = image.len(), mime = image.mime_type(), "Image upload received");
    submission_response(&state, state.session.submit(Some(image)).await)
}

/// POST /api/v1/analyze/url - Fetch an image by URL (or from dropped HTML) and analyze it
pub async fn analyze_url(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeUrlRequest>,
) -> Response {
    let url = req
        .url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| req.html.as_deref().and_then(ingest::extract_image_url_from_html));
    let Some(url) = url else {
        return submission_response(&state, state.session.submit(None).await);
    };

    let image = match ingest::from_url(&state.http, &url, state.max_image_bytes).await {
        Ok(image) => image,
        Err(e) => return ApiErrorResponse::from_pipeline(&e),
    };

    info!(url = %url, "Image URL submitted");
    submission_response(&state, state.session.submit(Some(image)).await)
}

fn submission_response(state: &ApiState, submission: Submission) -> Response {
    let status = submission.status();
    match submission {
        Submission::NoImage => ApiErrorResponse::bad_request("no image supplied"),
        Submission::Completed {
            invocation,
            result: Ok(outcome),
        } => ApiResponse::ok(SubmissionResponse {
            status,
            invocation,
            display: Some(outcome.raw.clone()),
            outcome: Some(outcome),
            state: None,
        }),
        Submission::Completed { result: Err(e), .. } => ApiErrorResponse::from_pipeline(&e),
        Submission::Duplicate { invocation } | Submission::Stale { invocation } => {
            ApiResponse::ok(SubmissionResponse {
                status,
                invocation,
                display: None,
                outcome: None,
                state: Some(state.session.state()),
            })
        }
    }
}

// ============================================================================
// Read Endpoints
// ============================================================================

/// GET /api/v1/analysis - Current session state
pub async fn get_analysis(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.session.state())
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub in_progress: bool,
    pub model: String,
    pub backend: &'static str,
    pub state: &'static str,
    pub latest_invocation: Option<InvocationId>,
    pub stats: PipelineStats,
}

/// GET /api/v1/status - In-progress signal and backend info
pub async fn get_status(State(state): State<ApiState>) -> Response {
    let session = &state.session;
    let current = session.state();
    let backend = session.pipeline().backend();
    ApiResponse::ok(StatusResponse {
        in_progress: session.in_progress(),
        model: backend.model().to_string(),
        backend: backend.backend_name(),
        state: current.name(),
        latest_invocation: current.invocation(),
        stats: session.pipeline().stats(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health - Liveness
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
