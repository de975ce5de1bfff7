//! Rate limiter for Jikan requests.
//!
//! Enforces both a minimum spacing between requests and a sliding
//! one-minute request budget.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter with dual constraints (per-second and per-minute)
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum gap between two requests
    min_interval: Duration,
    /// Maximum requests per sliding minute
    max_per_minute: usize,
    /// Request timestamps inside the current window, oldest first
    window: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_per_second: f64, max_per_minute: u32) -> Self {
        Self {
            // Rates that are not positive and finite fall back to one per second
            min_interval: Duration::try_from_secs_f64(1.0 / max_per_second)
                .unwrap_or(Duration::from_secs(1)),
            max_per_minute: max_per_minute.max(1) as usize,
            window: VecDeque::with_capacity(max_per_minute as usize),
        }
    }

    /// Wait until a request can be made, then record it
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        self.expire(now);

        let mut wait = Duration::ZERO;

        if self.window.len() >= self.max_per_minute {
            if let Some(&oldest) = self.window.front() {
                wait = wait.max(WINDOW.saturating_sub(now.duration_since(oldest)));
            }
        }

        if let Some(&last) = self.window.back() {
            wait = wait.max(self.min_interval.saturating_sub(now.duration_since(last)));
        }

        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit: waiting");
            sleep(wait).await;
        }

        let request_time = Instant::now();
        self.expire(request_time);
        self.window.push_back(request_time);
    }

    /// Number of requests made in the last minute
    pub fn current_minute_count(&mut self) -> usize {
        self.expire(Instant::now());
        self.window.len()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.duration_since(oldest) < WINDOW {
                break;
            }
            self.window.pop_front();
        }
    }
}
