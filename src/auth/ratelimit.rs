//! Sliding-window rate limiter, grounded on `authn/throttling.py`'s
//! `APIKeyRateThrottle` (DRF's `SimpleRateThrottle`): a fixed duration
//! window holding up to `max_requests` timestamps per key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the caller identified by `key` is still under
    /// the limit, recording this attempt as a hit in that case.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().expect("rate limiter mutex poisoned");
        let entry = hits.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);
        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_limit() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
    }
}
