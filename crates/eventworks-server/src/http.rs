//! Minimal `/healthz` surface, grounded in the teacher's health-check
//! router (`rustpress-health`) but scaled down to this process's one real
//! job: report whether its infrastructure dependencies are reachable.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use eventworks_core::health::{HealthRegistry, Status};
use std::sync::Arc;

pub fn router(registry: Arc<HealthRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(registry)
}

async fn healthz(State(registry): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    let report = registry.check_all().await;
    let status = match report.status {
        Status::Healthy => StatusCode::OK,
        Status::Degraded => StatusCode::OK,
        Status::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}
