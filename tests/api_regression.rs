//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

use common::{chair_session, ScriptedBackend, Step, CHAIR_COORDINATES};
use material_origin::api::{create_app, ApiState};

fn create_test_app() -> (Arc<ScriptedBackend>, ApiState, Router) {
    let (backend, session) = chair_session();
    let state = ApiState::new(session, reqwest::Client::new(), 1024);
    let app = create_app(state.clone());
    (backend, state, app)
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn upload(bytes: &'static [u8], content_type: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/analyze")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn test_get_endpoints_return_200() {
    for endpoint in ["/health", "/api/v1/status", "/api/v1/analysis"] {
        let (_, _, app) = create_test_app();
        let resp = app
            .oneshot(Request::builder().uri(endpoint).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{endpoint} should return 200");
    }
}

#[tokio::test]
async fn test_status_before_any_submission() {
    let (_, _, app) = create_test_app();
    let resp = app
        .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let v = json_body(resp).await;

    assert_eq!(v["data"]["in_progress"], false);
    assert_eq!(v["data"]["state"], "idle");
    assert_eq!(v["data"]["backend"], "scripted");
    assert_eq!(v["data"]["model"], "scripted-model");
    assert!(v["data"]["latest_invocation"].is_null());
    assert!(v["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_upload_returns_coordinates() {
    let (backend, state, app) = create_test_app();

    let resp = app
        .clone()
        .oneshot(upload(b"chair", "image/jpeg"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["data"]["status"], "completed");
    assert_eq!(v["data"]["display"], CHAIR_COORDINATES);
    assert_eq!(v["data"]["outcome"]["coordinates"][0]["place"], "Vermont");
    assert_eq!(backend.request_count(), 3);
    assert!(!state.session.in_progress());

    let resp = app
        .oneshot(Request::get("/api/v1/analysis").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let v = json_body(resp).await;
    assert_eq!(v["data"]["state"], "done");
    assert_eq!(v["data"]["outcome"]["raw"], CHAIR_COORDINATES);
}

#[tokio::test]
async fn test_duplicate_upload_is_not_reanalyzed() {
    let (backend, _, app) = create_test_app();

    let first = app.clone().oneshot(upload(b"chair", "image/png")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(upload(b"chair", "image/png")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let v = json_body(second).await;
    assert_eq!(v["data"]["status"], "duplicate");
    assert_eq!(v["data"]["state"]["state"], "done");
    assert_eq!(backend.request_count(), 3);
}

#[tokio::test]
async fn test_non_image_upload_is_input_error() {
    let (backend, _, app) = create_test_app();
    let resp = app.oneshot(upload(b"hello", "text/plain")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(v["error"]["code"], "INPUT_ERROR");
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_empty_upload_sends_nothing() {
    let (backend, state, app) = create_test_app();
    let resp = app.oneshot(upload(b"", "image/png")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.request_count(), 0);
    assert!(!state.session.in_progress());
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let (backend, _, app) = create_test_app();
    backend.set_description(Step::Fail("connection refused".to_string()));

    let resp = app.oneshot(upload(b"chair", "image/png")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let v = json_body(resp).await;
    assert_eq!(v["error"]["code"], "UPSTREAM_ERROR");
    assert!(v["error"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let (backend, _, app) = create_test_app();
    static BIG: [u8; 2048] = [7u8; 2048];

    let resp = app.oneshot(upload(&BIG, "image/png")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_analyze_url_with_data_url() {
    let (backend, _, app) = create_test_app();
    let body = serde_json::json!({ "url": "data:image/png;base64,aGVsbG8=" });

    let resp = app
        .oneshot(
            Request::post("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["data"]["display"], CHAIR_COORDINATES);
    assert_eq!(backend.requests()[0].image.as_ref().unwrap().data, "aGVsbG8=");
}

#[tokio::test]
async fn test_analyze_url_from_dropped_html() {
    let (backend, _, app) = create_test_app();
    let body = serde_json::json!({
        "html": "<div><img alt=\"x\" src=\"data:image/gif;base64,R0lGODlh\"></div>"
    });

    let resp = app
        .oneshot(
            Request::post("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        backend.requests()[0].image.as_ref().unwrap().mime_type,
        "image/gif"
    );
}

#[tokio::test]
async fn test_analyze_url_without_image_is_input_error() {
    let (backend, _, app) = create_test_app();
    let body = serde_json::json!({ "html": "<p>no pictures here</p>" });

    let resp = app
        .oneshot(
            Request::post("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_analyze_url_relative_img_src_is_no_image() {
    let (backend, _, app) = create_test_app();
    let body = serde_json::json!({ "html": "<img src=\"/static/chair.png\">" });

    let resp = app
        .oneshot(
            Request::post("/api/v1/analyze/url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(v["error"]["code"], "INPUT_ERROR");
    assert!(v["error"]["message"].as_str().unwrap().contains("no image supplied"));
    assert_eq!(backend.request_count(), 0);
}
