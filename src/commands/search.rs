//! Search command implementation.

use crate::cache::{self, Cache, SearchResult, SearchService};
use crate::config::Config;
use crate::engine::ListingSource;
use crate::filters::{FilterChain, FilterChainBuilder};
use crate::format::Formatter;
use crate::models::{Listing, SearchQuery};
use crate::platforms::{connect, Platform};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to search and how to narrow the results.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: SearchQuery,
    /// Marketplaces to search, in output order
    pub platforms: Vec<Platform>,
    pub min_price: Option<f64>,
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    /// Fetch each listing's own page as well
    pub details: bool,
}

impl SearchOptions {
    pub fn new(query: SearchQuery, platforms: Vec<Platform>) -> Self {
        Self {
            query,
            platforms,
            min_price: None,
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            details: false,
        }
    }

    fn filters(&self) -> FilterChain {
        FilterChainBuilder::new()
            .price_range(self.min_price, None)
            .keywords(self.keywords.clone())
            .exclude_keywords(self.exclude_keywords.clone())
            .build()
    }
}

/// Executes a listing search on one or more marketplaces.
pub struct SearchCommand {
    config: Config,
    cache: Arc<dyn Cache>,
}

impl SearchCommand {
    /// Uses the on-disk cache, so repeated searches across runs are served locally.
    pub fn new(config: Config) -> Self {
        let cache = cache::open(&config.cache);
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: Config, cache: Arc<dyn Cache>) -> Self {
        Self { config, cache }
    }

    /// Validates the query, connects to each platform and runs the search.
    pub async fn execute(&self, options: &SearchOptions) -> Result<String> {
        options.query.validate()?;

        let mut sources = Vec::with_capacity(options.platforms.len());
        for platform in &options.platforms {
            let source = connect(*platform, self.config.scraper.clone())
                .with_context(|| format!("Failed to set up {} scraper", platform.label()))?;
            sources.push(source);
        }

        self.execute_with_sources(sources, options).await
    }

    /// Runs the search with provided sources (for testing).
    ///
    /// A platform that fails is skipped with a warning as long as another
    /// one produced results.
    pub async fn execute_with_sources(
        &self,
        sources: Vec<Box<dyn ListingSource>>,
        options: &SearchOptions,
    ) -> Result<String> {
        options.query.validate()?;

        let filters = options.filters();
        if !filters.is_empty() {
            debug!("Active filters: {}", filters.descriptions().join(", "));
        }

        let mut results: Vec<SearchResult> = Vec::new();
        let mut first_error = None;

        for source in sources {
            let service =
                SearchService::new(source, Some(Arc::clone(&self.cache)), self.config.cache.clone());
            let platform = service.platform();
            info!("Searching {} for: {}", platform.label(), options.query.query);

            let mut result = match service.search(&options.query).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{} search failed: {:#}", platform.label(), e);
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            let found = result.listings.len();
            result.listings = filters.apply(result.listings);
            debug!("{}: {} listings ({} after filtering)", platform, found, result.listings.len());

            if options.details {
                result.listings = with_details(&service, result.listings).await;
            }

            results.push(result);
        }

        if results.is_empty() {
            return match first_error {
                Some(e) => Err(e),
                None => bail!("No platform selected"),
            };
        }

        let formatter = Formatter::new(self.config.format);
        let listings: Vec<Listing> =
            results.iter().flat_map(|r| r.listings.iter().cloned()).collect();
        info!("Found {} listings matching criteria", listings.len());

        let mut output = formatter.format_listings(&listings);
        let summaries: Vec<String> = results
            .iter()
            .map(|r| formatter.format_summary(r))
            .filter(|s| !s.is_empty())
            .collect();
        if !summaries.is_empty() {
            output.push_str("\n\n");
            output.push_str(&summaries.join("\n"));
        }

        Ok(output)
    }
}

/// Enriches each listing from its own page, keeping the search record when that fails.
async fn with_details(service: &SearchService, listings: Vec<Listing>) -> Vec<Listing> {
    let mut detailed = Vec::with_capacity(listings.len());
    for listing in listings {
        match service.details(listing.clone()).await {
            Ok(enriched) => detailed.push(enriched),
            Err(e) => {
                warn!("Could not fetch details for '{}': {:#}", listing.title, e);
                detailed.push(listing);
            }
        }
    }
    detailed
}
