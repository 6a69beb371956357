//! Rate limiting primitives for the signup endpoints.
//!
//! Limits are checked per client IP and per normalized email before any code
//! is generated or compared. [`WindowRateLimiter`] keeps fixed windows in
//! process memory, so limits are per instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::error;

const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);
const DEFAULT_IP_LIMIT: u32 = 30;
const DEFAULT_EMAIL_LIMIT: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    VerifyEmail,
    ValidateCode,
    Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window counter keyed by action and client IP or email.
#[derive(Debug)]
pub struct WindowRateLimiter {
    window: Duration,
    ip_limit: u32,
    email_limit: u32,
    buckets: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, ip_limit: u32, email_limit: u32) -> Self {
        Self {
            window,
            ip_limit,
            email_limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn hit(&self, action: RateLimitAction, key: String, limit: u32) -> RateLimitDecision {
        let Ok(mut buckets) = self.buckets.lock() else {
            error!("Rate limiter state poisoned");
            // Fail closed.
            return RateLimitDecision::Limited;
        };

        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.started_at) < self.window);

        let bucket = buckets.entry((action, key)).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if bucket.count >= limit {
            return RateLimitDecision::Limited;
        }
        bucket.count += 1;
        RateLimitDecision::Allowed
    }
}

impl Default for WindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_IP_LIMIT, DEFAULT_EMAIL_LIMIT)
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Requests without a forwarded address share one bucket.
        let key = ip.unwrap_or("unknown").to_string();
        self.hit(action, key, self.ip_limit)
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.hit(action, email.to_string(), self.email_limit)
    }
}
