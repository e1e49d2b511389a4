use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("agent_chat_requests_total", "Total number of chat requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("agent_rate_limited_total", "Requests denied by the rate limiter").unwrap();
    pub static ref AUTH_FAILURES: Counter =
        register_counter!("agent_auth_failures_total", "Requests with a bad or missing API key").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("agent_upstream_failures_total", "Failed completion API calls").unwrap();
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "agent_tool_calls_total",
        "Tool invocations requested by the model",
        &["tool"]
    )
    .unwrap();
    pub static ref TOOL_CACHE_HITS: Counter =
        register_counter!("agent_tool_cache_hits_total", "Total tool cache hits").unwrap();
    pub static ref TOOL_CACHE_MISSES: Counter =
        register_counter!("agent_tool_cache_misses_total", "Total tool cache misses").unwrap();
    pub static ref CHAT_LATENCY: Histogram = register_histogram!(
        "agent_chat_latency_seconds",
        "Chat request latency in seconds"
    )
    .unwrap();
    pub static ref TOOL_CACHE_SIZE: Gauge =
        register_gauge!("agent_tool_cache_size", "Current number of cached tool results").unwrap();
}

// Prometheus text exposition of the default registry
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| format!("Encode error: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Encode error: {}", e))
}
