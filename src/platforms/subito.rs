//! Subito.it adapter.
//!
//! Subito pages 25 ads per results page and paginates with an `o=` offset.
//! Update the rules below when the markup changes, and add a fixture.

use crate::engine::rules::{DetailRules, ExtractionRules, FieldRule, Locator, Strategy};
use crate::models::SearchQuery;
use crate::platforms::{append_param, Platform, SourceAdapter};
use regex_lite::Regex;
use std::sync::LazyLock;

/// Ads per results page.
pub const PAGE_SIZE: u32 = 25;

static RULES: LazyLock<ExtractionRules> = LazyLock::new(|| ExtractionRules {
    strategies: vec![
        Strategy::new("data-id", Locator::css("div[data-id]")),
        Strategy::new("class-pattern", Locator::class_pattern("div", "item|listing|ad-item")),
        Strategy::new("ad-link", Locator::href_pattern(r"/\w+/\w+/.*\.htm")),
    ],
    title: vec![
        FieldRule::text(Locator::css("h2")),
        FieldRule::text(Locator::css("h3")),
        FieldRule::text(Locator::class_pattern("*", "title|heading")),
        FieldRule::text(Locator::itself(Some("a"))),
    ],
    link: vec![
        FieldRule::attr(Locator::css("a[href]"), "href"),
        FieldRule::attr(Locator::itself(Some("a")), "href"),
    ],
    price: vec![FieldRule::text(Locator::class_pattern("*", "price|prezzo"))],
    photo: vec![
        FieldRule::attr(Locator::css("img[src]"), "src"),
        FieldRule::attr(Locator::css("img[data-src]"), "data-src"),
    ],
    location: vec![FieldRule::text(Locator::class_pattern("*", "location|city|town"))],
    id_attr: Some("data-id"),
    id_pattern: Some(Regex::new(r"(\d+)\.htm").unwrap()),
    extras: Vec::new(),
    strip_link_query: false,
    placeholder_titles: Vec::new(),
    details: DetailRules {
        description: vec![FieldRule::text(Locator::class_pattern("div", "description|desc|body"))],
        gallery: vec![Locator::class_pattern("div", "gallery|carousel|images")],
        seller_name: vec![FieldRule::text(Locator::class_pattern("*", "seller|vendor|owner"))],
        category: vec![FieldRule::text(Locator::class_pattern("a", "category|breadcrumb"))],
        posted_date: vec![FieldRule::text(Locator::class_pattern("*", "date|published|posted"))],
    },
});

/// Subito.it source adapter.
#[derive(Debug, Clone)]
pub struct Subito {
    base_url: String,
}

impl Subito {
    pub fn new() -> Self {
        Self::with_base_url(Platform::Subito.base_url())
    }

    /// Creates an adapter against a custom base URL (for testing).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

impl Default for Subito {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Subito {
    fn platform(&self) -> Platform {
        Platform::Subito
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/annunci-italia[/{category}]?r={region}&q={query}`.
    ///
    /// Subito has no price or condition filter in the URL.
    fn search_url(&self, query: &SearchQuery) -> String {
        let mut url = format!("{}/annunci-italia", self.base_url);

        if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
            url.push('/');
            url.push_str(&urlencoding::encode(category.trim()));
        }
        if let Some(region) = query.region.as_deref().filter(|r| !r.is_empty()) {
            url = append_param(&url, "r", &urlencoding::encode(region));
        }
        if !query.query.trim().is_empty() {
            let words: Vec<String> = query
                .query
                .split_whitespace()
                .map(|w| urlencoding::encode(w).into_owned())
                .collect();
            url = append_param(&url, "q", &words.join("+"));
        }
        url
    }

    fn page_url(&self, first_page: &str, page: u32) -> String {
        if page <= 1 {
            return first_page.to_string();
        }
        let offset = (page - 1) * PAGE_SIZE;
        append_param(first_page, "o", &offset.to_string())
    }

    fn rules(&self) -> &ExtractionRules {
        &RULES
    }
}
