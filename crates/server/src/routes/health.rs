use axum::Json;
use thirdlogin_api::HealthResponse;

/// GET /api/health: server liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
