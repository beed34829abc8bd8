//! Supported marketplaces and their source adapters.
//!
//! An adapter knows how to build search and page URLs for one marketplace and
//! which selector rules describe its markup. Everything else (pacing, retries,
//! extraction, pagination) is shared by the engine.

pub mod ebay;
pub mod subito;

pub use ebay::Ebay;
pub use subito::Subito;

use crate::config::ScraperConfig;
use crate::engine::{ExtractionRules, ListingSource, Scraper, WreqTransport};
use crate::models::SearchQuery;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Supported marketplaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Subito,
    Ebay,
}

impl Platform {
    /// Returns the marketplace domain.
    pub fn domain(&self) -> &'static str {
        match self {
            Platform::Subito => "subito.it",
            Platform::Ebay => "ebay.it",
        }
    }

    /// Returns the production base URL.
    pub fn base_url(&self) -> String {
        format!("https://www.{}", self.domain())
    }

    /// Human-readable marketplace name.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Subito => "Subito.it",
            Platform::Ebay => "eBay.it",
        }
    }

    /// Guesses the marketplace an ad URL belongs to.
    pub fn from_url(url: &str) -> Option<Platform> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

        if on("subito.it") {
            Some(Platform::Subito)
        } else if on("ebay.it") || on("ebay.com") {
            Some(Platform::Ebay)
        } else {
            None
        }
    }

    /// The listing id encoded in an ad URL, if the URL carries one.
    pub fn listing_id(&self, url: &str) -> Option<String> {
        match self {
            Platform::Subito => Subito::new().rules().id_from_link(url),
            Platform::Ebay => Ebay::new().rules().id_from_link(url),
        }
    }

    /// Returns all supported platforms.
    pub fn all() -> &'static [Platform] {
        &[Platform::Subito, Platform::Ebay]
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "subito" | "subito.it" => Ok(Platform::Subito),
            "ebay" | "ebay.it" => Ok(Platform::Ebay),
            _ => Err(format!("Unknown platform: {}. Use: subito, ebay", s)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Subito => write!(f, "subito"),
            Platform::Ebay => write!(f, "ebay"),
        }
    }
}

/// Platform-specific URL building and selector tables.
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Base URL relative links are resolved against.
    fn base_url(&self) -> &str;

    /// URL of the first results page for a query.
    fn search_url(&self, query: &SearchQuery) -> String;

    /// URL of results page `page` (1-based). Page 1 is `first_page` itself.
    fn page_url(&self, first_page: &str, page: u32) -> String;

    fn rules(&self) -> &ExtractionRules;
}

/// Appends `key=value` to a URL that may or may not already carry a query.
pub(crate) fn append_param(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, value)
}

/// Builds a live scraper for a platform.
pub fn connect(platform: Platform, config: ScraperConfig) -> Result<Box<dyn ListingSource>> {
    config.validate()?;
    let transport = WreqTransport::new(&config)?;

    Ok(match platform {
        Platform::Subito => Box::new(Scraper::new(Subito::new(), transport, config)?),
        Platform::Ebay => Box::new(Scraper::new(Ebay::new(), transport, config)?),
    })
}
