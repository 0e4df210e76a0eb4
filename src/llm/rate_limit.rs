//! Sliding-window limiter for outbound LLM calls.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admits at most `max_requests` calls per `window`.
///
/// Timestamps older than the window are evicted lazily on each admission
/// check. Rejected calls are not recorded.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: VecDeque::with_capacity(max_requests),
        }
    }

    /// Try to admit a request now.
    pub fn acquire(&mut self) -> bool {
        self.acquire_at(Instant::now())
    }

    pub fn acquire_at(&mut self, now: Instant) -> bool {
        self.evict(now);
        if self.requests.len() >= self.max_requests {
            return false;
        }
        self.requests.push_back(now);
        true
    }

    /// Time until the oldest retained request leaves the window.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }

    pub fn wait_time_at(&self, now: Instant) -> Duration {
        if self.requests.len() < self.max_requests {
            return Duration::ZERO;
        }
        match self.requests.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Requests currently counted against the window.
    pub fn in_window(&self) -> usize {
        self.requests.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}
