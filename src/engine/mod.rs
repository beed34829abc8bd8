//! The scraping engine: pacing, retries, extraction and pagination.

pub mod extractor;
pub mod fetcher;
pub mod paginator;
pub mod rate_limiter;
pub mod rules;
pub mod stats;

pub use extractor::{parse_document, parse_price, Extractor};
pub use fetcher::{FetchRequest, FetchedPage, RetryingFetcher, Transport, WreqTransport};
pub use paginator::{ListingSource, ScrapeRun, Scraper, StopReason};
pub use rate_limiter::RateLimiter;
pub use rules::{ExtractionRules, FieldRule, Locator, Strategy};
pub use stats::{RunStatistics, StatsSnapshot};
