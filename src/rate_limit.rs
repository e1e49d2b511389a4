use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics::RATE_LIMITED_TOTAL;
use crate::usage::UsageTracker;

// Length of the sliding window
const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_minute: usize,
    pub per_hour: u64,
    // 0 disables the all-clients cap
    pub global_per_hour: u64,
    pub moderate_above: u64,
    pub high_above: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 30,
            per_hour: 200,
            global_per_hour: 1000,
            moderate_above: 100,
            high_above: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Normal,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MinuteWindow,
    HourlyLimit,
    GlobalLimit,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::MinuteWindow => "Rate limit exceeded. Try again in a minute.",
            DenyReason::HourlyLimit => "Hourly usage limit exceeded. Try again later.",
            DenyReason::GlobalLimit => "Service is busy. Try again later.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow { hourly: u64, level: UsageLevel },
    Deny(DenyReason),
}

// Per-client sliding minute window on top of the shared hour buckets
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    usage: Arc<UsageTracker>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, usage: Arc<UsageTracker>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            usage,
        }
    }

    pub fn check(&self, client: &str, now: DateTime<Utc>) -> RateDecision {
        // the entry guard serializes everything below for this client
        let mut window = self.windows.entry(client.to_string()).or_default();
        expire(&mut window, now);

        if window.len() >= self.config.per_minute {
            drop(window);
            warn!(target: "security", client, "rate limit exceeded");
            return self.deny(DenyReason::MinuteWindow);
        }

        window.push_back(now);
        let counts = self.usage.increment_hour(client, now);
        drop(window);

        if counts.client > self.config.per_hour {
            error!(target: "security", client, hourly = counts.client, "usage limit exceeded");
            return self.deny(DenyReason::HourlyLimit);
        }
        if self.config.global_per_hour > 0 && counts.global > self.config.global_per_hour {
            error!(target: "security", client, global = counts.global, "global usage limit exceeded");
            return self.deny(DenyReason::GlobalLimit);
        }

        let level = if counts.client > self.config.high_above {
            warn!(target: "security", client, hourly = counts.client, "high usage");
            UsageLevel::High
        } else if counts.client > self.config.moderate_above {
            info!(target: "security", client, hourly = counts.client, "moderate usage");
            UsageLevel::Moderate
        } else {
            UsageLevel::Normal
        };
        self.usage.record_admitted(client, now);

        RateDecision::Allow {
            hourly: counts.client,
            level,
        }
    }

    /// Drops windows with no live timestamps. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            expire(window, now);
            !window.is_empty()
        });
        before - self.windows.len()
    }

    fn deny(&self, reason: DenyReason) -> RateDecision {
        RATE_LIMITED_TOTAL.inc();
        self.usage.record_blocked();
        RateDecision::Deny(reason)
    }
}

fn expire(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let max_age = Duration::seconds(WINDOW_SECS);
    while let Some(&oldest) = window.front() {
        if now - oldest > max_age {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    impl RateDecision {
        fn is_allowed(&self) -> bool {
            matches!(self, RateDecision::Allow { .. })
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn limiter(config: RateLimitConfig) -> (RateLimiter, Arc<UsageTracker>) {
        let usage = Arc::new(UsageTracker::new());
        (RateLimiter::new(config, usage.clone()), usage)
    }

    #[test]
    fn thirty_per_minute_then_deny() {
        let (limiter, usage) = limiter(RateLimitConfig::default());
        let t0 = start();

        for i in 0..30 {
            let decision = limiter.check("10.0.0.1", t0 + Duration::seconds(i));
            assert!(decision.is_allowed(), "request {} should pass", i + 1);
        }
        assert_eq!(
            limiter.check("10.0.0.1", t0 + Duration::seconds(45)),
            RateDecision::Deny(DenyReason::MinuteWindow)
        );
        // the minute-denied request did not count toward the hour
        assert_eq!(usage.hourly_count("10.0.0.1", t0), 30);
        assert_eq!(usage.blocked_requests(), 1);
    }

    #[test]
    fn window_slides_after_sixty_seconds() {
        let (limiter, _) = limiter(RateLimitConfig::default());
        let t0 = start();
        for _ in 0..30 {
            assert!(limiter.check("a", t0).is_allowed());
        }
        assert!(!limiter.check("a", t0 + Duration::seconds(59)).is_allowed());
        assert!(limiter.check("a", t0 + Duration::seconds(61)).is_allowed());
    }

    #[test]
    fn clients_are_limited_independently() {
        let (limiter, _) = limiter(RateLimitConfig::default());
        let t0 = start();
        for _ in 0..30 {
            limiter.check("a", t0);
        }
        assert!(!limiter.check("a", t0).is_allowed());
        assert!(limiter.check("b", t0).is_allowed());
    }

    #[test]
    fn hourly_count_grows_by_one_per_allowed_request() {
        let (limiter, usage) = limiter(RateLimitConfig::default());
        let t0 = start();
        for i in 1..=5u64 {
            let decision = limiter.check("a", t0 + Duration::minutes(i as i64 * 2));
            assert_eq!(
                decision,
                RateDecision::Allow {
                    hourly: i,
                    level: UsageLevel::Normal
                }
            );
            assert_eq!(usage.hourly_count("a", t0), i);
        }
    }

    #[test]
    fn usage_levels_and_hourly_cap() {
        let (limiter, _) = limiter(RateLimitConfig {
            per_minute: 1000,
            ..RateLimitConfig::default()
        });
        let t0 = start();
        let mut decisions = Vec::new();
        for _ in 0..205 {
            decisions.push(limiter.check("a", t0));
        }

        assert_eq!(
            decisions[99],
            RateDecision::Allow { hourly: 100, level: UsageLevel::Normal }
        );
        assert_eq!(
            decisions[100],
            RateDecision::Allow { hourly: 101, level: UsageLevel::Moderate }
        );
        assert_eq!(
            decisions[150],
            RateDecision::Allow { hourly: 151, level: UsageLevel::High }
        );
        assert_eq!(
            decisions[199],
            RateDecision::Allow { hourly: 200, level: UsageLevel::High }
        );
        for decision in &decisions[200..] {
            assert_eq!(*decision, RateDecision::Deny(DenyReason::HourlyLimit));
        }
    }

    #[test]
    fn denied_requests_are_not_top_clients() {
        let (limiter, usage) = limiter(RateLimitConfig {
            per_minute: 1000,
            per_hour: 2,
            ..RateLimitConfig::default()
        });
        let t0 = start();
        for _ in 0..5 {
            limiter.check("a", t0);
        }
        assert!(limiter.check("b", t0 + Duration::hours(1)).is_allowed());

        let stats = usage.snapshot(t0 + Duration::hours(1));
        assert_eq!(stats.top_ips["a"], 2);
        assert_eq!(stats.top_ips["b"], 1);
        assert_eq!(stats.blocked_requests, 3);
    }

    #[test]
    fn hourly_cap_resets_with_the_next_hour() {
        let (limiter, _) = limiter(RateLimitConfig {
            per_minute: 1000,
            per_hour: 2,
            ..RateLimitConfig::default()
        });
        let t0 = start();
        limiter.check("a", t0);
        limiter.check("a", t0);
        assert!(!limiter.check("a", t0).is_allowed());
        assert!(limiter.check("a", t0 + Duration::hours(1)).is_allowed());
    }

    #[test]
    fn global_cap_applies_across_clients() {
        let (limiter, _) = limiter(RateLimitConfig {
            global_per_hour: 3,
            ..RateLimitConfig::default()
        });
        let t0 = start();
        assert!(limiter.check("a", t0).is_allowed());
        assert!(limiter.check("b", t0).is_allowed());
        assert!(limiter.check("c", t0).is_allowed());
        assert_eq!(
            limiter.check("d", t0),
            RateDecision::Deny(DenyReason::GlobalLimit)
        );
    }

    #[test]
    fn concurrent_checks_lose_no_updates() {
        let (limiter, usage) = limiter(RateLimitConfig {
            per_minute: 10_000,
            per_hour: 10_000,
            global_per_hour: 0,
            ..RateLimitConfig::default()
        });
        let t0 = start();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        assert!(limiter.check("a", t0).is_allowed());
                    }
                });
            }
        });

        assert_eq!(usage.hourly_count("a", t0), 4000);
        assert_eq!(usage.snapshot(t0).top_ips["a"], 4000);
    }

    #[test]
    fn sweep_removes_idle_windows() {
        let (limiter, _) = limiter(RateLimitConfig::default());
        let t0 = start();
        limiter.check("a", t0);
        limiter.check("b", t0 + Duration::seconds(50));
        assert_eq!(limiter.sweep(t0 + Duration::seconds(90)), 1);
    }
}
