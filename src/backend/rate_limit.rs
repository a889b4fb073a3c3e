//! Sliding-window request limiter.
//!
//! One limiter exists per backend and is shared by every job using that
//! backend, so the cap holds process-wide rather than per job.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Admits at most `capacity` requests in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// The usual shape: `n` requests per rolling minute.
    pub fn per_minute(n: usize) -> Self {
        Self::new(n, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until a request may be sent, then record it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock();
                let now = Instant::now();
                while let Some(&oldest) = sent.front() {
                    if now.duration_since(oldest) >= self.window {
                        sent.pop_front();
                    } else {
                        break;
                    }
                }
                if sent.len() < self.capacity {
                    sent.push_back(now);
                    return;
                }
                match sent.front() {
                    // Clock skew can make this negative; saturate to zero.
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };
            debug!(
                "Rate limit reached ({} per {:?}); waiting {:.1}s",
                self.capacity,
                self.window,
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    /// Requests currently counted against the window.
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.sent
            .lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
