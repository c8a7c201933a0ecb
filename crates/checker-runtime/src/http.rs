//! HTTP surface: the check endpoint and the Prometheus endpoint
//!
//! | Route | Port | Purpose |
//! |-------|------|---------|
//! | `GET /check?filename=<list>` | checker | may the group's validator client start |
//! | `GET /health` | checker | liveness |
//! | `GET /metrics` | metrics | Prometheus text format |
//!
//! `/check` answers `200` with a decision, `202` while the check is
//! inconclusive (cooldown running, too little data), `400` for a bad list,
//! `503` when the beacon node is unreachable and `500` on storage failure.
//! `start` is `false` on every non-200 answer.

use crate::validators::{load_group, ValidatorListError};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dg_detection::{DetectionError, DoppelgangerApi};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn DoppelgangerApi>,
    pub validators_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckResponse {
    pub start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inconclusive: Option<bool>,
}

impl CheckResponse {
    fn refused(error: impl ToString, inconclusive: bool) -> Self {
        Self {
            start: false,
            error: Some(error.to_string()),
            inconclusive: inconclusive.then_some(true),
        }
    }
}

/// Routes served on the checker port
pub fn check_router(state: AppState) -> Router {
    Router::new()
        .route("/check", get(check))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Routes served on the metrics port
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

async fn check(State(state): State<AppState>, Query(query): Query<CheckQuery>) -> Response {
    let Some(filename) = query.filename.filter(|f| !f.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(CheckResponse::refused("filename query parameter is required", false)),
        )
            .into_response();
    };

    let group = match load_group(&state.validators_dir, &filename).await {
        Ok(group) => group,
        Err(e) => return list_error_response(e),
    };

    match state.api.evaluate_group(&group).await {
        Ok(decision) => {
            info!(group = %filename, start = decision.start, "check answered");
            (
                StatusCode::OK,
                Json(CheckResponse {
                    start: decision.start,
                    ..Default::default()
                }),
            )
                .into_response()
        }
        Err(e) => detection_error_response(&filename, e),
    }
}

fn list_error_response(e: ValidatorListError) -> Response {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %e, "validator list unreadable");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(CheckResponse::refused(e, false))).into_response()
}

fn detection_error_response(group: &str, e: DetectionError) -> Response {
    let status = match &e {
        e if e.is_inconclusive() => StatusCode::ACCEPTED,
        DetectionError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        DetectionError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if e.is_transient() {
        warn!(group, error = %e, "check failed");
    } else if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(group, error = %e, "check failed");
    }
    let inconclusive = e.is_inconclusive();
    (status, Json(CheckResponse::refused(e, inconclusive))).into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
