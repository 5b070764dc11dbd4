//! Per-route token-bucket-style fixed-window rate limiter (spec §4.6).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_WINDOW_MS: i64 = 60_000;
pub const DEFAULT_MAX_REQUESTS: u32 = 120;
pub const DEFAULT_MAX_STREAM_REQUESTS: u32 = 30;
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
    pub max_stream_requests: u32,
    pub max_buckets: usize,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
            max_stream_requests: DEFAULT_MAX_STREAM_REQUESTS,
            max_buckets: DEFAULT_MAX_BUCKETS,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at_ms: i64,
    /// Only set when `allowed` is false.
    pub retry_after_seconds: Option<i64>,
}

struct Bucket {
    count: u32,
    reset_at_ms: i64,
}

/// A route is "streaming" when its path ends with `/subscribe` or
/// `/message/stream` (spec §4.6); such routes get the lower `M_stream` cap.
pub fn is_stream_route(path: &str) -> bool {
    path.ends_with("/subscribe") || path.ends_with("/message/stream")
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// `check` at time `now_ms`; separated from [`Self::check`] so tests
    /// can drive the window deterministically without sleeping.
    pub fn check_at(&self, key_name: &str, route_path: &str, now_ms: i64) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_at_ms: now_ms + self.config.window_ms,
                retry_after_seconds: None,
            };
        }

        let limit = if is_stream_route(route_path) {
            self.config.max_stream_requests
        } else {
            self.config.max_requests
        };

        let bucket_key = (key_name.to_string(), route_path.to_string());
        let mut buckets = self.buckets.lock().unwrap();

        if buckets.len() >= self.config.max_buckets && !buckets.contains_key(&bucket_key) {
            evict_earliest(&mut buckets, 1);
        }

        let bucket = buckets.entry(bucket_key).or_insert_with(|| Bucket {
            count: 0,
            reset_at_ms: now_ms + self.config.window_ms,
        });

        if now_ms >= bucket.reset_at_ms {
            bucket.count = 0;
            bucket.reset_at_ms = now_ms + self.config.window_ms;
        }

        if bucket.count >= limit {
            let retry_after = ((bucket.reset_at_ms - now_ms) + 999) / 1000;
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                limit,
                reset_at_ms: bucket.reset_at_ms,
                retry_after_seconds: Some(retry_after.max(1)),
            };
        }

        bucket.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - bucket.count,
            limit,
            reset_at_ms: bucket.reset_at_ms,
            retry_after_seconds: None,
        }
    }

    pub fn check(&self, key_name: &str, route_path: &str) -> RateLimitDecision {
        self.check_at(key_name, route_path, now_epoch_ms())
    }
}

fn evict_earliest(buckets: &mut HashMap<(String, String), Bucket>, n: usize) {
    let mut keys: Vec<(String, String)> = buckets.keys().cloned().collect();
    keys.sort_by_key(|k| buckets[k].reset_at_ms);
    for key in keys.into_iter().take(n) {
        buckets.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mth_request_succeeds_and_m_plus_first_is_denied() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            ..Default::default()
        });
        let now = 0;
        for _ in 0..3 {
            let decision = limiter.check_at("key1", "/v1/chat/completions", now);
            assert!(decision.allowed);
        }
        let denied = limiter.check_at("key1", "/v1/chat/completions", now);
        assert!(!denied.allowed);
        assert!(denied.retry_after_seconds.unwrap() >= 1);
    }

    #[test]
    fn stream_routes_use_the_lower_cap() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_stream_requests: 1,
            ..Default::default()
        });
        let first = limiter.check_at("key1", "/a2a/tasks/t1/subscribe", 0);
        assert!(first.allowed);
        assert_eq!(first.limit, 1);
        let second = limiter.check_at("key1", "/a2a/tasks/t1/subscribe", 0);
        assert!(!second.allowed);
    }

    #[test]
    fn bucket_resets_after_window_elapses() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_ms: 1000,
            ..Default::default()
        });
        assert!(limiter.check_at("key1", "/v1/messages", 0).allowed);
        assert!(!limiter.check_at("key1", "/v1/messages", 500).allowed);
        assert!(limiter.check_at("key1", "/v1/messages", 1500).allowed);
    }

    #[test]
    fn overflow_evicts_earliest_resetting_bucket() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_buckets: 2,
            ..Default::default()
        });
        limiter.check_at("a", "/x", 0);
        limiter.check_at("b", "/x", 100);
        limiter.check_at("c", "/x", 200);
        let buckets = limiter.buckets.lock().unwrap();
        assert_eq!(buckets.len(), 2);
        assert!(!buckets.contains_key(&("a".to_string(), "/x".to_string())));
    }
}
