use axum::Json;
use chrono::Utc;

use crate::models::HealthResponse;

// Liveness probe, never authenticated
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
