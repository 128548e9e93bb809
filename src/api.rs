// src/api.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::StateUpdateError;
use crate::ingest::ScoredItem;
use crate::scheduler::SchedulerStatus;
use crate::service::CollectorService;

pub fn create_router(service: CollectorService) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/data", get(get_data))
        .route("/api/stats", get(get_stats))
        .route("/api/status", get(get_status))
        .route("/api/enable", post(set_enabled))
        .route("/api/config", post(update_config))
        .route("/api/run-now", post(run_now))
        .layer(CorsLayer::very_permissive())
        .with_state(service)
}

fn error_response(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "success": false, "error": msg.to_string() }))).into_response()
}

async fn get_data(State(svc): State<CollectorService>) -> Json<Vec<ScoredItem>> {
    Json(svc.get_data().await)
}

/// `null` until the first successful run.
async fn get_stats(State(svc): State<CollectorService>) -> Response {
    Json(svc.get_stats().await).into_response()
}

async fn get_status(State(svc): State<CollectorService>) -> Json<SchedulerStatus> {
    Json(svc.get_status().await)
}

#[derive(Deserialize)]
struct EnableReq {
    enabled: bool,
}

async fn set_enabled(State(svc): State<CollectorService>, Json(body): Json<EnableReq>) -> Response {
    match svc.set_enabled(body.enabled).await {
        Ok(state) => Json(json!({ "success": true, "config": state })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn update_config(
    State(svc): State<CollectorService>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    if !patch.is_object() {
        return error_response(StatusCode::BAD_REQUEST, "expected a JSON object");
    }
    match svc.update_config(&patch).await {
        Ok(state) => Json(json!({ "success": true, "config": state })).into_response(),
        Err(e @ StateUpdateError::Invalid(_)) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn run_now(State(svc): State<CollectorService>) -> Response {
    match svc.run_now().await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
