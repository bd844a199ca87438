//! Health check handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

/// Body of `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when the bucket is reachable, otherwise `degraded`.
    pub status: String,
    pub bucket: String,
    pub region: String,
    pub s3_accessible: bool,
}

/// `GET /health` -- probe the bucket and report the configured location.
///
/// Always answers 200; an unreachable bucket is reported as `degraded`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Service status", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let accessible = state.gateway.check_reachable().await;
    Json(HealthResponse {
        status: if accessible { "ok" } else { "degraded" }.to_string(),
        bucket: state.gateway.bucket().to_string(),
        region: state.config.storage.region.clone(),
        s3_accessible: accessible,
    })
}
