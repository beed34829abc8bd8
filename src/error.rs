//! Error types for the scraping engine.
//!
//! Only configuration problems and exhausted fetches surface as errors.
//! Missing fields and unparseable candidates are silently dropped by the
//! extractor and never show up here.

use thiserror::Error;

/// Invalid scraper configuration. Raised at construction, never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("requests_per_second must be > 0 (got {0})")]
    RequestsPerSecond(f64),

    #[error("min_delay must be >= 0 (got {0})")]
    MinDelay(f64),

    #[error("max_delay ({max}) must be >= min_delay ({min})")]
    DelayRange { min: f64, max: f64 },

    #[error("retry_delay must be >= 0 (got {0})")]
    RetryDelay(f64),

    #[error("backoff_factor must be > 0 (got {0})")]
    BackoffFactor(f64),

    #[error("{field} is too large to schedule (got {value})")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("request_timeout must be at least 1 second")]
    RequestTimeout,

    #[error("user agent pool is empty")]
    EmptyUserAgents,
}

/// A single failed attempt. Recovered locally by backing off and retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Connection, TLS, timeout or body read failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Retries are exhausted for a URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted { url: String, attempts: u32, last: AttemptError },
}

impl FetchError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// A search request rejected before any scraping happens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("query must be between 2 and 100 characters")]
    Length,

    #[error("query contains invalid character '{0}'")]
    InvalidChar(char),

    #[error("max price must be in (0, 1000000] (got {0})")]
    MaxPrice(f64),

    #[error("max pages must be between 1 and 5 (got {0})")]
    MaxPages(u32),

    #[error("region must be between 3 and 50 characters")]
    Region,
}

/// A cache backend failure. Callers log it and carry on without the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cached value is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised by the report store.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid report: {0}")]
    Invalid(String),

    #[error("report store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}
