//! Per-client sliding window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Allows at most `burst` requests per client within `window`.
pub struct RateLimiter {
    burst: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(burst: usize, window: Duration) -> Self {
        Self {
            burst,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `client`; false if it exceeds the burst.
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let hits = clients.entry(client.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }
        if hits.len() >= self.burst {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Forget clients with no request inside the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.retain(|_, hits| {
            hits.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_reject_then_recover() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limiter.check_at("1.2.3.4", t0));
        assert!(limiter.check_at("1.2.3.4", t0 + Duration::from_secs(1)));
        assert!(!limiter.check_at("1.2.3.4", t0 + Duration::from_secs(2)));
        // Other clients have their own window.
        assert!(limiter.check_at("5.6.7.8", t0 + Duration::from_secs(2)));
        // First hit slides out of the window.
        assert!(limiter.check_at("1.2.3.4", t0 + Duration::from_secs(10)));
    }

    #[test]
    fn rejected_requests_do_not_extend_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(limiter.check_at("c", t0));
        assert!(!limiter.check_at("c", t0 + Duration::from_secs(4)));
        assert!(limiter.check_at("c", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn prune_drops_idle_clients() {
        let limiter = RateLimiter::new(1, Duration::from_millis(1));
        limiter.check_at("c", Instant::now() - Duration::from_secs(1));
        limiter.prune();
        assert!(limiter.clients.lock().unwrap().is_empty());
    }
}
