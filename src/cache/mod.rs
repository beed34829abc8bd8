//! Cache-aside search service.
//!
//! Search results and single listings are cached as JSON under deterministic
//! keys. The cache is an optimisation only: a miss, a decode problem or a
//! backend error falls through to a live scrape.

mod file;

pub use file::FileCache;

use crate::config::CacheConfig;
use crate::engine::{ListingSource, StatsSnapshot, StopReason};
use crate::error::CacheError;
use crate::filters::{Filter, PriceFilter};
use crate::models::{Listing, SearchQuery};
use crate::platforms::Platform;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

type Entries = HashMap<String, (String, Option<Instant>)>;

/// In-process cache. Expired entries are evicted lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Entries>, CacheError> {
        self.entries.lock().map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, Some(expires))) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        // A TTL past the end of the clock never expires
        let expires = Instant::now().checked_add(ttl);
        self.lock()?.insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// The cache a CLI run should use: files under `config.dir` or the user cache
/// directory, in memory when neither is available.
pub fn open(config: &CacheConfig) -> Arc<dyn Cache> {
    match config.dir.clone().or_else(FileCache::default_dir) {
        Some(dir) => {
            debug!("Caching under {}", dir.display());
            Arc::new(FileCache::new(dir))
        }
        None => {
            warn!("No cache directory available, caching in memory for this run only");
            Arc::new(MemoryCache::new())
        }
    }
}

/// Key for a search: `search:` plus the SHA-256 of the sorted search parameters.
pub fn search_key(platform: Platform, query: &SearchQuery) -> String {
    // serde_json maps are ordered by key, so the encoding is stable
    let params = serde_json::json!({
        "platform": platform,
        "query": query.query,
        "category": query.category,
        "max_price": query.max_price,
        "region": query.region,
    });

    let digest = Sha256::digest(params.to_string().as_bytes());
    format!("search:{}", hex::encode(digest))
}

/// Key for one listing.
pub fn listing_key(listing_id: &str) -> String {
    format!("listing:{}", listing_id)
}

/// What a search returned and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub platform: Platform,
    pub listings: Vec<Listing>,
    pub cached: bool,
    /// Present only for live runs.
    pub stop: Option<StopReason>,
    pub pages_fetched: u32,
    pub stats: Option<StatsSnapshot>,
}

/// Runs searches against one source with cache-aside.
pub struct SearchService {
    source: Box<dyn ListingSource>,
    cache: Option<Arc<dyn Cache>>,
    config: CacheConfig,
}

impl SearchService {
    pub fn new(source: Box<dyn ListingSource>, cache: Option<Arc<dyn Cache>>, config: CacheConfig) -> Self {
        let cache = cache.filter(|_| config.enabled);
        if cache.is_none() {
            debug!("Search cache disabled");
        }
        Self { source, cache, config }
    }

    pub fn platform(&self) -> Platform {
        self.source.platform()
    }

    /// Serves a search from cache or runs it live.
    ///
    /// Live results are filtered by `max_price` (unpriced listings are kept).
    /// Fails only when not a single page could be fetched.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let platform = self.source.platform();
        let key = search_key(platform, query);

        if let Some(listings) = self.cached::<Vec<Listing>>(&key).await {
            info!("Cache hit for '{}' on {} ({} listings)", query.query, platform, listings.len());
            return Ok(SearchResult {
                platform,
                listings,
                cached: true,
                stop: None,
                pages_fetched: 0,
                stats: None,
            });
        }

        let run = self.source.search(query).await;
        if run.pages_fetched == 0 && run.stop == StopReason::FetchError {
            bail!("Could not fetch any results from {}", platform.label());
        }

        let listings = match query.max_price {
            Some(max) => {
                let filter = PriceFilter::max(max);
                run.listings.into_iter().filter(|l| filter.matches(l)).collect()
            }
            None => run.listings,
        };

        self.store(&key, &listings, self.config.search_ttl_secs).await;
        for listing in &listings {
            if let Some(id) = &listing.listing_id {
                self.store(&listing_key(id), listing, self.config.listing_ttl_secs).await;
            }
        }

        Ok(SearchResult {
            platform,
            listings,
            cached: false,
            stop: Some(run.stop),
            pages_fetched: run.pages_fetched,
            stats: Some(run.stats),
        })
    }

    /// A listing seen by an earlier search, if still cached.
    pub async fn listing(&self, listing_id: &str) -> Option<Listing> {
        self.cached(&listing_key(listing_id)).await
    }

    /// Fetches the listing's own page, caching the enriched record.
    pub async fn details(&self, listing: Listing) -> Result<Listing> {
        let listing = self.source.scrape_listing_details(listing).await?;
        if let Some(id) = &listing.listing_id {
            self.store(&listing_key(id), &listing, self.config.listing_ttl_secs).await;
        }
        Ok(listing)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.source.stats()
    }

    async fn cached<V: serde::de::DeserializeOwned>(&self, key: &str) -> Option<V> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("Cache HIT: {}", key);
                    Some(value)
                }
                Err(e) => {
                    warn!("Ignoring undecodable cache entry {}: {}", key, CacheError::from(e));
                    None
                }
            },
            Ok(None) => {
                debug!("Cache MISS: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl_secs: u64) {
        let Some(cache) = &self.cache else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not serialize {} for caching: {}", key, e);
                return;
            }
        };

        match cache.set(key, raw, Duration::from_secs(ttl_secs)).await {
            Ok(()) => debug!("Cache SET: {} (TTL: {}s)", key, ttl_secs),
            Err(e) => warn!("Cache write failed for {}: {}", key, e),
        }
    }
}
