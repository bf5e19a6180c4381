use crate::services::get_metrics;
use crate::SERVICE_NAME;
use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness check used by the browser client.
pub async fn api_test() -> Json<Value> {
    Json(json!({ "message": "API is working!" }))
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}
