//! Listing details command implementation.

use crate::cache::{self, Cache, SearchService};
use crate::config::Config;
use crate::engine::ListingSource;
use crate::format::Formatter;
use crate::models::Listing;
use crate::platforms::{connect, Platform};
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tracing::info;

/// Fetches one listing page by URL.
pub struct DetailsCommand {
    config: Config,
    cache: Arc<dyn Cache>,
}

impl DetailsCommand {
    pub fn new(config: Config) -> Self {
        let cache = cache::open(&config.cache);
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: Config, cache: Arc<dyn Cache>) -> Self {
        Self { config, cache }
    }

    /// Detects the marketplace from the URL, fetches the page and returns formatted output.
    pub async fn execute(&self, url: &str) -> Result<String> {
        let platform = detect_platform(url)?;
        let source = connect(platform, self.config.scraper.clone())
            .with_context(|| format!("Failed to set up {} scraper", platform.label()))?;

        self.execute_with_source(source, url).await
    }

    /// Fetches the listing with a provided source (for testing).
    ///
    /// A cached record that already went through a detail fetch is served as is.
    /// One cached by a search is used as the starting point for the fetch.
    pub async fn execute_with_source(&self, source: Box<dyn ListingSource>, url: &str) -> Result<String> {
        let url = url.trim();
        let platform = detect_platform(url)?;
        if platform != source.platform() {
            bail!("{} is not a {} listing", url, source.platform().label());
        }

        let service = SearchService::new(source, Some(Arc::clone(&self.cache)), self.config.cache.clone());
        let listing_id = platform.listing_id(url);
        let cached = match &listing_id {
            Some(id) => service.listing(id).await,
            None => None,
        };

        let listing = match cached {
            Some(listing) if listing.description.is_some() => {
                info!("Serving listing {} from cache", url);
                listing
            }
            cached => {
                info!("Fetching listing: {}", url);
                let mut listing = cached.unwrap_or_else(|| {
                    let mut listing = Listing::new("", platform);
                    listing.listing_id = listing_id;
                    listing
                });
                listing.link.get_or_insert_with(|| url.to_string());

                service
                    .details(listing)
                    .await
                    .with_context(|| format!("Failed to fetch listing {}", url))?
            }
        };

        Ok(Formatter::new(self.config.format).format_listing(&listing))
    }
}

fn detect_platform(url: &str) -> Result<Platform> {
    Platform::from_url(url.trim())
        .ok_or_else(|| anyhow!("Unsupported listing URL: '{}'. Use a subito.it or ebay link.", url))
}
