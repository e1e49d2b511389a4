//! In-memory usage counter.
//!
//! Holds the append-only log of completed requests, the calendar-hour buckets
//! the rate limiter compares against, and per-client totals. Everything lives
//! for the lifetime of the process and is lost on restart.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Scope key used for the all-clients hour bucket.
const GLOBAL_SCOPE: &str = "*";

/// How many clients `/usage-stats` lists, by admitted requests in the report window.
const TOP_CLIENTS: usize = 10;

/// Hours covered by the `requests_last_24h` report and kept by the sweeper.
pub const REPORT_HOURS: i64 = 24;

/// One completed chat request. Never mutated once logged.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub client_identifier: String,
    pub timestamp: DateTime<Utc>,
    pub estimated_tokens: u64,
}

/// Coarse calendar-hour key, e.g. `2026-10-19-14`.
pub fn hour_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d-%H").to_string()
}

/// Counts after one admitted request was added to the current hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourCounts {
    pub client: u64,
    pub global: u64,
}

#[derive(Debug, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub estimated_total_tokens: u64,
    pub requests_last_24h: BTreeMap<String, u64>,
    pub top_ips: BTreeMap<String, u64>,
}

#[derive(Default)]
pub struct UsageTracker {
    records: Mutex<Vec<UsageRecord>>,
    // (scope, hour key) -> count, scope is a client identifier or GLOBAL_SCOPE
    hourly: DashMap<(String, String), u64>,
    // (client, hour key) -> requests that passed every limit
    admitted: DashMap<(String, String), u64>,
    blocked: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one admitted request to the client's and the global bucket for `now`.
    pub fn increment_hour(&self, client: &str, now: DateTime<Utc>) -> HourCounts {
        let hour = hour_key(now);

        let client_count = {
            let mut entry = self
                .hourly
                .entry((client.to_string(), hour.clone()))
                .or_insert(0);
            *entry += 1;
            *entry
        };
        let global_count = {
            let mut entry = self
                .hourly
                .entry((GLOBAL_SCOPE.to_string(), hour))
                .or_insert(0);
            *entry += 1;
            *entry
        };

        HourCounts {
            client: client_count,
            global: global_count,
        }
    }

    /// Counts a request the rate limiter let through. Feeds `top_ips`.
    pub fn record_admitted(&self, client: &str, now: DateTime<Utc>) {
        *self
            .admitted
            .entry((client.to_string(), hour_key(now)))
            .or_insert(0) += 1;
    }

    #[cfg(test)]
    pub fn hourly_count(&self, client: &str, now: DateTime<Utc>) -> u64 {
        self.hourly
            .get(&(client.to_string(), hour_key(now)))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn record(&self, record: UsageRecord) {
        self.records.lock().push(record);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn total_requests(&self) -> u64 {
        self.records.lock().len() as u64
    }

    pub fn blocked_requests(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Drops hour buckets that fell out of the report window.
    pub fn prune_hours(&self, now: DateTime<Utc>) -> usize {
        let cutoff = report_cutoff(now);
        let before = self.hourly.len() + self.admitted.len();
        // keys are zero padded so lexical order is chronological
        self.hourly.retain(|(_, hour), _| *hour >= cutoff);
        self.admitted.retain(|(_, hour), _| *hour >= cutoff);
        before - self.hourly.len() - self.admitted.len()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageStats {
        let (total_requests, estimated_total_tokens) = {
            let records = self.records.lock();
            let tokens = records.iter().map(|r| r.estimated_tokens).sum();
            (records.len() as u64, tokens)
        };

        let mut requests_last_24h = BTreeMap::new();
        for back in 0..REPORT_HOURS {
            let hour = hour_key(now - Duration::hours(back));
            if let Some(count) = self.hourly.get(&(GLOBAL_SCOPE.to_string(), hour.clone())) {
                requests_last_24h.insert(hour, *count);
            }
        }

        let cutoff = report_cutoff(now);
        let mut per_client: HashMap<String, u64> = HashMap::new();
        for entry in self.admitted.iter() {
            let (client, hour) = entry.key();
            if *hour >= cutoff {
                *per_client.entry(client.clone()).or_insert(0) += *entry.value();
            }
        }
        let mut clients: Vec<(String, u64)> = per_client.into_iter().collect();
        clients.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_ips = clients.into_iter().take(TOP_CLIENTS).collect();

        UsageStats {
            total_requests,
            blocked_requests: self.blocked_requests(),
            estimated_total_tokens,
            requests_last_24h,
            top_ips,
        }
    }
}

// Oldest hour key still inside the report window
fn report_cutoff(now: DateTime<Utc>) -> String {
    hour_key(now - Duration::hours(REPORT_HOURS - 1))
}
