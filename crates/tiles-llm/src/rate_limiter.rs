//! Sliding-window admission control for outbound provider calls.
//!
//! Each granted call's [`Instant`] is recorded in a deque. On `acquire()`,
//! timestamps older than the window are pruned; if the window is still full
//! the caller sleeps until the oldest entry leaves it, plus a small margin,
//! and tries again.
//!
//! Waiters queue on a fair `tokio::sync::Mutex` held across the sleep, so
//! admission follows `acquire()` call order.

use std::collections::VecDeque;
use std::time::Duration;

use tiles_types::config::RateLimitConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A sliding-window limiter of `max_calls` per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    /// Grant times inside the window, oldest first.
    calls: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    window: Duration,
    margin: Duration,
}

impl RateLimiter {
    /// Create a limiter with the default 50ms margin.
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self::with_margin(max_calls, window, Duration::from_millis(50))
    }

    pub fn with_margin(max_calls: usize, window: Duration, margin: Duration) -> Self {
        Self {
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
            max_calls: max_calls.max(1),
            window,
            margin,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_margin(
            config.max_calls as usize,
            Duration::from_secs(config.window_secs),
            Duration::from_millis(config.margin_ms),
        )
    }

    /// Wait for admission and record the call. Returns how long the caller
    /// was suspended by the window (zero when admitted immediately).
    pub async fn acquire(&self) -> Duration {
        let mut calls = self.calls.lock().await;
        let mut waited = Duration::ZERO;

        loop {
            let now = Instant::now();
            prune(&mut calls, now, self.window);

            if calls.len() < self.max_calls {
                calls.push_back(now);
                return waited;
            }

            let Some(&oldest) = calls.front() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest)) + self.margin;
            debug!(
                in_window = calls.len(),
                max_calls = self.max_calls,
                wait_ms = wait.as_millis() as u64,
                "rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Calls currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        prune(&mut calls, Instant::now(), self.window);
        calls.len()
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn prune(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = calls.front() {
        if now.duration_since(front) >= window {
            calls.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn next_call_suspends_until_oldest_expires() {
        let window = Duration::from_millis(300);
        let limiter = RateLimiter::with_margin(2, window, Duration::from_millis(10));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        let waited = limiter.acquire().await;
        let elapsed = start.elapsed();

        assert!(waited > Duration::ZERO);
        assert!(elapsed >= window, "third call admitted after {elapsed:?}");
    }

    #[tokio::test]
    async fn window_expiry_frees_capacity() {
        let limiter = RateLimiter::with_margin(1, Duration::from_millis(50), Duration::ZERO);
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(limiter.in_window().await, 0);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn waiters_admitted_in_call_order() {
        let limiter = Arc::new(RateLimiter::with_margin(
            1,
            Duration::from_millis(60),
            Duration::from_millis(5),
        ));
        limiter.acquire().await;

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().push(i);
            }));
            // Let each task reach the mutex queue before spawning the next.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn from_config_defaults() {
        let limiter = RateLimiter::from_config(&RateLimitConfig::default());
        assert_eq!(limiter.max_calls(), 20);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }

    #[test]
    fn zero_max_calls_is_clamped() {
        assert_eq!(RateLimiter::new(0, Duration::from_secs(1)).max_calls(), 1);
    }
}
