//! eBay.it adapter.
//!
//! Results are restricted to Buy It Now listings and paginate with `_pgn=`.

use crate::engine::rules::{DetailRules, ExtractionRules, FieldRule, Locator, Strategy};
use crate::models::{Condition, SearchQuery};
use crate::platforms::{append_param, Platform, SourceAdapter};
use regex_lite::Regex;
use std::sync::LazyLock;

static RULES: LazyLock<ExtractionRules> = LazyLock::new(|| ExtractionRules {
    strategies: vec![
        Strategy::new("s-item-wrapper", Locator::css("div.s-item__wrapper")),
        Strategy::new("s-item", Locator::css("li.s-item")),
        Strategy::new("data-view", Locator::css("div[data-view='mi:1686|iid:1']")),
        Strategy::new("item-link", Locator::css("a[href*='/itm/']")),
    ],
    title: vec![
        FieldRule::text(Locator::css("div.s-item__title")),
        FieldRule::text(Locator::css("h3.s-item__title")),
        FieldRule::text(Locator::css("span[role='heading']")),
        FieldRule::text(Locator::itself(Some("a"))),
    ],
    link: vec![
        FieldRule::attr(Locator::css("a.s-item__link[href]"), "href"),
        FieldRule::attr(Locator::css("a[href*='/itm/']"), "href"),
        FieldRule::attr(Locator::itself(Some("a")), "href"),
    ],
    price: vec![
        FieldRule::text(Locator::css("span.s-item__price")),
        FieldRule::text(Locator::css("span.POSITIVE")),
    ],
    photo: vec![
        FieldRule::attr(Locator::css("img.s-item__image-img"), "src"),
        FieldRule::attr(Locator::css("img.s-item__image-img"), "data-src"),
        FieldRule::attr(Locator::css("img[src]"), "src"),
    ],
    location: vec![FieldRule::text(Locator::css("span.s-item__location"))],
    id_attr: None,
    id_pattern: Some(Regex::new(r"/itm/(\d+)").unwrap()),
    extras: vec![
        ("condition", vec![FieldRule::text(Locator::css("span.SECONDARY_INFO"))]),
        ("shipping", vec![FieldRule::text(Locator::css("span.s-item__shipping"))]),
    ],
    strip_link_query: true,
    placeholder_titles: vec!["shop on ebay", "shop su ebay", "nuova inserzione"],
    details: DetailRules {
        description: vec![
            FieldRule::text(Locator::css("div#desc_div")),
            FieldRule::text(Locator::css("div.vi-desc-wrapper")),
            FieldRule::text(Locator::css("div[data-testid='x-item-description']")),
        ],
        gallery: vec![Locator::css("div.ux-image-carousel")],
        seller_name: vec![FieldRule::text(Locator::css("span.mbg-nw"))],
        category: vec![FieldRule::text(Locator::css("nav[aria-label='breadcrumb'] a")).last()],
        posted_date: Vec::new(),
    },
});

/// eBay.it source adapter.
#[derive(Debug, Clone)]
pub struct Ebay {
    base_url: String,
}

impl Ebay {
    pub fn new() -> Self {
        Self::with_base_url(Platform::Ebay.base_url())
    }

    /// Creates an adapter against a custom base URL (for testing).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

impl Default for Ebay {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for Ebay {
    fn platform(&self) -> Platform {
        Platform::Ebay
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/sch/i.html?_nkw=…[&_sacat=…][&_udhi=…][&LH_ItemCondition=…]&LH_BIN=1`.
    ///
    /// Categories are eBay's numeric category ids; the region is ignored.
    fn search_url(&self, query: &SearchQuery) -> String {
        let mut params: Vec<String> = Vec::new();

        if !query.query.trim().is_empty() {
            let words: Vec<String> = query
                .query
                .split_whitespace()
                .map(|w| urlencoding::encode(w).into_owned())
                .collect();
            params.push(format!("_nkw={}", words.join("+")));
        }
        if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
            params.push(format!("_sacat={}", urlencoding::encode(category.trim())));
        }
        if let Some(max_price) = query.max_price.filter(|p| *p > 0.0) {
            params.push(format!("_udhi={}", max_price.trunc() as u64));
        }
        match query.condition {
            Some(Condition::New) => params.push("LH_ItemCondition=1000".to_string()),
            Some(Condition::Used) => params.push("LH_ItemCondition=3000".to_string()),
            None => {}
        }
        // Buy It Now only, no auctions
        params.push("LH_BIN=1".to_string());

        format!("{}/sch/i.html?{}", self.base_url, params.join("&"))
    }

    fn page_url(&self, first_page: &str, page: u32) -> String {
        if page <= 1 {
            return first_page.to_string();
        }
        append_param(first_page, "_pgn", &page.to_string())
    }

    fn rules(&self) -> &ExtractionRules {
        &RULES
    }
}
