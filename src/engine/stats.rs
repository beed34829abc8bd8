//! Run statistics owned by one scraper instance.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Monotonic counters. Only [`RunStatistics::reset`] moves them backwards.
#[derive(Debug, Default)]
pub struct RunStatistics {
    requests: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    listings_found: AtomicU64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One HTTP attempt was issued.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch finally succeeded.
    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch gave up after exhausting its retries.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listings(&self, count: usize) {
        self.listings_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            listings_found: self.listings_found.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.listings_found.store(0, Ordering::Relaxed);
        info!("Statistics reset");
    }
}

/// Point-in-time copy of [`RunStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub listings_found: u64,
}

impl StatsSnapshot {
    /// Share of fetches (not attempts) that succeeded, in `0.0..=1.0`.
    pub fn success_rate(&self) -> Option<f64> {
        let outcomes = self.successful + self.failed;
        (outcomes > 0).then(|| self.successful as f64 / outcomes as f64)
    }
}
