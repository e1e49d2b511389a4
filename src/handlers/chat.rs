use axum::{Json, extract::State};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ApiError;
use crate::extract::{Authenticated, ClientId};
use crate::gate;
use crate::metrics::{CHAT_LATENCY, REQUEST_TOTAL};
use crate::models::ChatResponse;
use crate::rate_limit::RateDecision;
use crate::state::AppState;

// Gate, then rate limiter, then the model. The body is taken raw so its size is
// checked before parsing.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    _auth: Authenticated,
    body: String,
) -> Result<Json<ChatResponse>, ApiError> {
    REQUEST_TOTAL.inc();

    let request = gate::admit(&body, &client)?;

    match state.limiter.check(&client, Utc::now()) {
        RateDecision::Deny(reason) => {
            return Err(ApiError::RateLimited(reason.message().to_string()));
        }
        RateDecision::Allow { hourly, level } => {
            debug!(client = %client, hourly, ?level, "request admitted");
        }
    }

    let start_time = Instant::now();
    let result = state.orchestrator.chat(&client, &request).await;
    CHAT_LATENCY.observe(start_time.elapsed().as_secs_f64());

    result.map(Json)
}
