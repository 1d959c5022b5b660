//! `GET /health` always returns 200, plus the Kubernetes-style
//! liveness/readiness probes every admin surface in this stack carries
//! alongside a health endpoint.

use axum::response::IntoResponse;
use axum::Json;

use crate::api::model::HealthResponse;

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, description = "Always 200 when the process is up", body = HealthResponse)))]
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "UP" })
}

#[utoipa::path(get, path = "/health/live", tag = "health", responses((status = 200, body = HealthResponse)))]
pub async fn liveness_probe() -> impl IntoResponse {
    Json(HealthResponse { status: "UP" })
}

#[utoipa::path(get, path = "/health/ready", tag = "health", responses((status = 200, body = HealthResponse)))]
pub async fn readiness_probe() -> impl IntoResponse {
    Json(HealthResponse { status: "UP" })
}
