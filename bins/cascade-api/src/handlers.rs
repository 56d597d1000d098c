// HTTP route handlers for the Cascade API

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cascade_common::types::{ExecutionRequest, TestCase};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub language: String,
    pub source_code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub caller_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunTestsBody {
    pub language: String,
    pub source_code: String,
    #[serde(alias = "tests")]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub caller_id: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Empty language or source is rejected before any backend is contacted
fn validate(language: &str, source_code: &str) -> Option<Response> {
    if language.trim().is_empty() {
        return Some(bad_request("language is required"));
    }
    if source_code.trim().is_empty() {
        return Some(bad_request("source_code must not be empty"));
    }
    None
}

/// POST /execute - Run a program once through the fallback chain
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteBody>,
) -> Response {
    metrics::HTTP_REQUESTS.with_label_values(&["execute"]).inc();
    if let Some(rejection) = validate(&payload.language, &payload.source_code) {
        warn!(language = %payload.language, "Rejected execute request");
        return rejection;
    }

    let request_id = Uuid::new_v4();
    let mut request = ExecutionRequest::new(payload.language, payload.source_code)
        .with_caller(payload.caller_id);
    request.stdin = payload.stdin;

    let started = Instant::now();
    let result = state.service.execute(&request).await;
    let elapsed = started.elapsed();

    metrics::EXECUTION_LATENCY
        .with_label_values(&["execute"])
        .observe(elapsed.as_secs_f64());
    metrics::EXECUTIONS
        .with_label_values(&[result.status.id.to_string().as_str()])
        .inc();

    info!(
        request_id = %request_id,
        language = %request.language_key(),
        status_id = result.status.id,
        elapsed_ms = elapsed.as_millis() as u64,
        "Execution served"
    );

    (StatusCode::OK, Json(result)).into_response()
}

/// POST /run-tests - Grade a program against a list of test cases
pub async fn run_tests(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunTestsBody>,
) -> Response {
    metrics::HTTP_REQUESTS.with_label_values(&["run_tests"]).inc();
    if let Some(rejection) = validate(&payload.language, &payload.source_code) {
        warn!(language = %payload.language, "Rejected run-tests request");
        return rejection;
    }

    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let run = state
        .service
        .run_tests(
            &payload.language,
            &payload.source_code,
            &payload.test_cases,
            payload.caller_id.as_deref(),
        )
        .await;
    let elapsed = started.elapsed();

    metrics::EXECUTION_LATENCY
        .with_label_values(&["run_tests"])
        .observe(elapsed.as_secs_f64());
    metrics::TEST_RUNS
        .with_label_values(&[run.status.to_string().as_str()])
        .inc();

    info!(
        request_id = %request_id,
        language = %payload.language,
        total = run.total,
        passed = run.passed,
        status = %run.status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Test run served"
    );

    (StatusCode::OK, Json(run)).into_response()
}

/// GET /languages - Capability listing, in fallback order
pub async fn languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::HTTP_REQUESTS.with_label_values(&["languages"]).inc();
    Json(serde_json::json!({
        "languages": state.service.languages(),
        "backends": state.service.capabilities(),
    }))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_endpoint() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
