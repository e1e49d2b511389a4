use chrono::Utc;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::state::AppState;

// Housekeeping loop - keeps the in-memory maps from growing without bound
pub async fn sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "sweeper started");

    loop {
        interval.tick().await;
        sweep_once(&state);
    }
}

pub fn sweep_once(state: &AppState) {
    let now = Utc::now();
    let windows = state.limiter.sweep(now);
    let buckets = state.usage.prune_hours(now);
    let cached = state.tool_cache.evict_expired();

    if windows + buckets + cached > 0 {
        debug!(windows, buckets, cached, "swept stale entries");
    }
}
