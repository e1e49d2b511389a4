use axum::http::StatusCode;

pub async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    crate::metrics::render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))
}
