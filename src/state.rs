use std::sync::Arc;

use crate::cache::ToolCache;
use crate::orchestrator::Orchestrator;
use crate::rate_limit::RateLimiter;
use crate::usage::UsageTracker;

// app's shared state, built once at startup and never persisted
pub struct AppState {
    pub api_secret: String,
    pub trust_forwarded_for: bool,
    pub usage: Arc<UsageTracker>,
    pub limiter: RateLimiter,
    pub orchestrator: Orchestrator,
    pub tool_cache: Arc<ToolCache>,
}
