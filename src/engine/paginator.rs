//! Page-by-page traversal of a marketplace's search results.

use crate::config::ScraperConfig;
use crate::engine::extractor::{parse_document, Extractor};
use crate::engine::fetcher::{RetryingFetcher, Transport};
use crate::engine::rate_limiter::RateLimiter;
use crate::engine::stats::{RunStatistics, StatsSnapshot};
use crate::error::{ConfigError, FetchError};
use crate::models::{Listing, SearchQuery};
use crate::platforms::{Platform, SourceAdapter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a run stopped paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A page could not be fetched even after retries.
    FetchError,
    /// A page yielded no valid listings.
    EmptyPage,
    /// The page budget was used up.
    MaxPages,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::FetchError => write!(f, "fetch_error"),
            StopReason::EmptyPage => write!(f, "empty_page"),
            StopReason::MaxPages => write!(f, "max_pages"),
        }
    }
}

/// Outcome of one pagination run. Always carries whatever was collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub platform: Platform,
    pub listings: Vec<Listing>,
    pub stop: StopReason,
    pub pages_fetched: u32,
    /// Scraper statistics at the time the run ended.
    pub stats: StatsSnapshot,
}

/// Capability set shared by every marketplace scraper.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Builds the search URL for `query` and scrapes up to `query.max_pages` pages.
    async fn search(&self, query: &SearchQuery) -> ScrapeRun;

    /// Scrapes results starting at an explicit first-page URL.
    async fn scrape_listings(&self, first_page_url: &str, max_pages: u32) -> ScrapeRun;

    /// Fetches the listing's own page and fills in what it shows.
    ///
    /// A listing without a link is returned unchanged.
    async fn scrape_listing_details(&self, listing: Listing) -> Result<Listing, FetchError>;

    fn stats(&self) -> StatsSnapshot;

    fn reset_stats(&self);
}

/// Generic scraper: one adapter's rules driven by the shared engine.
pub struct Scraper<A, T> {
    adapter: A,
    config: ScraperConfig,
    fetcher: RetryingFetcher<T>,
    limiter: Arc<RateLimiter>,
    stats: Arc<RunStatistics>,
}

impl<A: SourceAdapter, T: Transport> Scraper<A, T> {
    /// Creates a scraper with its own rate limiter. Fails fast on invalid config.
    pub fn new(adapter: A, transport: T, config: ScraperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::from_config(&config));
        Self::with_limiter(adapter, transport, config, limiter)
    }

    /// Creates a scraper sharing a rate limiter with other scrapers.
    pub fn with_limiter(
        adapter: A,
        transport: T,
        config: ScraperConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stats = Arc::new(RunStatistics::new());
        let fetcher =
            RetryingFetcher::new(transport, &config, Arc::clone(&limiter), Arc::clone(&stats));

        debug!("Created {} scraper", adapter.platform());
        Ok(Self { adapter, config, fetcher, limiter, stats })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Forgets the last request time so an unrelated run starts without a pause.
    pub async fn reset_limiter(&self) {
        self.limiter.reset().await;
    }

    fn extractor(&self) -> Extractor<'_> {
        Extractor::new(self.adapter.platform(), self.adapter.base_url(), self.adapter.rules())
    }

    /// Parses a page and extracts its listings. The parsed tree never crosses an await.
    fn extract_page(&self, body: &str) -> Vec<Listing> {
        let document = parse_document(body, self.config.parser);
        self.extractor().extract_listings(&document)
    }

    fn extract_details(&self, body: &str, listing: Listing) -> Listing {
        let document = parse_document(body, self.config.parser);
        self.extractor().extract_details(&document, listing)
    }

    /// Writes a fetched page under `{output_dir}/html` when enabled.
    fn save_html(&self, page: u32, body: &str) {
        if !self.config.save_html {
            return;
        }

        let dir = self.config.output_dir.join("html");
        let path = dir.join(format!("{}_page_{}.html", self.adapter.platform(), page));
        match std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, body)) {
            Ok(()) => debug!("Saved HTML: {}", path.display()),
            Err(e) => warn!("Failed to save HTML to {}: {}", path.display(), e),
        }
    }

    /// Writes the run's listings under `{output_dir}/json` when enabled.
    fn save_json(&self, listings: &[Listing]) -> Option<PathBuf> {
        if !self.config.save_json {
            return None;
        }

        let dir = self.config.output_dir.join("json");
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.json", self.adapter.platform(), stamp));

        let written = serde_json::to_string_pretty(listings)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, json)));
        match written {
            Ok(()) => {
                debug!("Saved JSON: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to save JSON to {}: {}", path.display(), e);
                None
            }
        }
    }

    fn finish(&self, listings: Vec<Listing>, stop: StopReason, pages_fetched: u32) -> ScrapeRun {
        let stats = self.stats.snapshot();
        info!(
            "{}: {} listings from {} page(s), stopped on {} ({} requests, {} failed)",
            self.adapter.platform(),
            listings.len(),
            pages_fetched,
            stop,
            stats.requests,
            stats.failed
        );
        ScrapeRun { platform: self.adapter.platform(), listings, stop, pages_fetched, stats }
    }
}

#[async_trait]
impl<A: SourceAdapter, T: Transport> ListingSource for Scraper<A, T> {
    fn platform(&self) -> Platform {
        self.adapter.platform()
    }

    async fn search(&self, query: &SearchQuery) -> ScrapeRun {
        let url = self.adapter.search_url(query);
        info!(
            "Searching {} for '{}' (category: {})",
            self.adapter.platform(),
            query.query,
            query.category.as_deref().unwrap_or("all")
        );

        let run = self.scrape_listings(&url, query.max_pages).await;
        self.save_json(&run.listings);
        run
    }

    async fn scrape_listings(&self, first_page_url: &str, max_pages: u32) -> ScrapeRun {
        let mut listings = Vec::new();
        let mut pages_fetched = 0;
        let mut page = 1;

        let stop = loop {
            if page > max_pages {
                break StopReason::MaxPages;
            }

            let url = self.adapter.page_url(first_page_url, page);
            info!("Scraping page {}/{}: {}", page, max_pages, url);

            let fetched = match self.fetcher.fetch(&url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!("Could not fetch page {}: {}", page, e);
                    break StopReason::FetchError;
                }
            };
            pages_fetched += 1;
            self.save_html(page, &fetched.body);

            let found = self.extract_page(&fetched.body);
            if found.is_empty() {
                warn!("No listings on page {}", page);
                break StopReason::EmptyPage;
            }

            info!("Found {} listings on page {}", found.len(), page);
            self.stats.record_listings(found.len());
            listings.extend(found);
            page += 1;
        };

        self.finish(listings, stop, pages_fetched)
    }

    async fn scrape_listing_details(&self, listing: Listing) -> Result<Listing, FetchError> {
        let Some(link) = listing.link.clone() else {
            warn!("Listing '{}' has no link, skipping details", listing.title);
            return Ok(listing);
        };

        debug!("Fetching details for {}", link);
        let fetched = self.fetcher.fetch(&link).await?;
        Ok(self.extract_details(&fetched.body, listing))
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn reset_stats(&self) {
        self.stats.reset();
    }
}
