//! adscout - classified-ad search for Subito.it and eBay.it
//!
//! A polite, rate-limited scraping engine with per-platform selector tables,
//! a cache-aside search service and a small abuse-report store.

pub mod cache;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod format;
pub mod models;
pub mod platforms;
pub mod reports;
pub mod risk;

pub use cache::{Cache, FileCache, MemoryCache, SearchResult, SearchService};
pub use config::{Config, ScraperConfig};
pub use engine::{ListingSource, ScrapeRun, Scraper, StatsSnapshot, StopReason};
pub use error::{ConfigError, FetchError, QueryError};
pub use models::{Condition, Listing, SearchQuery};
pub use platforms::{Platform, SourceAdapter};
pub use risk::{RiskAssessment, RiskLevel};
