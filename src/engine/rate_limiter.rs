//! Request pacing with a randomized spacing and a per-second cap.

use crate::config::{seconds, ScraperConfig};
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Serializes outbound requests.
///
/// Each call to [`wait`](RateLimiter::wait) after the first sleeps until
/// `max(uniform(min_delay, max_delay), 1 / requests_per_second)` has passed
/// since the previous request. The lock is held across the sleep, so callers
/// sharing one limiter queue up behind each other.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    floor: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter. `requests_per_second` must be positive. A spacing too long
    /// for a `Duration` saturates at `Duration::MAX`.
    pub fn new(requests_per_second: f64, min_delay: Duration, max_delay: Duration) -> Self {
        debug!(
            "RateLimiter: {} req/s, delay {:?}-{:?}",
            requests_per_second, min_delay, max_delay
        );
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            floor: seconds(1.0 / requests_per_second),
            last_request: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.requests_per_second, config.min_delay(), config.max_delay())
    }

    /// Blocks until the next request may go out, then stamps it. Returns the time slept.
    pub async fn wait(&self) -> Duration {
        let mut last = self.last_request.lock().await;

        let mut slept = Duration::ZERO;
        if let Some(previous) = *last {
            let required = self.required_delay();
            let elapsed = previous.elapsed();
            if elapsed < required {
                slept = required - elapsed;
                debug!("Rate limiting: sleeping {:.2}s", slept.as_secs_f64());
                tokio::time::sleep(slept).await;
            }
        }

        *last = Some(Instant::now());
        slept
    }

    /// Forgets the previous request, so the next `wait` returns immediately.
    pub async fn reset(&self) {
        *self.last_request.lock().await = None;
        debug!("RateLimiter reset");
    }

    /// Spacing required before the next request.
    fn required_delay(&self) -> Duration {
        let jitter = if self.max_delay > self.min_delay {
            let min = self.min_delay.as_secs_f64();
            let max = self.max_delay.as_secs_f64();
            seconds(rand::rng().random_range(min..=max))
        } else {
            self.min_delay
        };
        jitter.max(self.floor)
    }
}
