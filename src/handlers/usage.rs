use axum::{Json, extract::State};
use chrono::Utc;
use std::sync::Arc;

use crate::extract::Authenticated;
use crate::state::AppState;
use crate::usage::UsageStats;

pub async fn usage_stats_handler(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
) -> Json<UsageStats> {
    Json(state.usage.snapshot(Utc::now()))
}
