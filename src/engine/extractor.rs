//! Turns a parsed results page into validated listings.
//!
//! Candidates come from the first strategy in the platform's chain that
//! matches anything; strategies are never merged. Each field then walks its
//! own rule list. Missing fields stay `None` and candidates that end up
//! invalid are dropped without an error, since markup drift is routine.

use crate::config::HtmlParser;
use crate::engine::rules::{first_value, normalize_text, ExtractionRules, Locator};
use crate::models::Listing;
use crate::platforms::Platform;
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, trace};
use url::Url;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d.,]*").unwrap());

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());

/// Parses raw HTML with the configured mode.
pub fn parse_document(html: &str, mode: HtmlParser) -> Html {
    match mode {
        HtmlParser::Document => Html::parse_document(html),
        HtmlParser::Fragment => Html::parse_fragment(html),
    }
}

/// Parses a price as printed on Italian marketplaces.
///
/// Currency symbols and words are ignored, thousands separators dropped and a
/// decimal comma becomes a decimal point. Returns `None` when there is no
/// number at all ("Gratis", "Contattami").
pub fn parse_price(text: &str) -> Option<f64> {
    let compact: String =
        text.chars().filter(|c| !c.is_whitespace() && *c != '\'' && *c != '’').collect();
    let raw = NUMBER.find(&compact)?.as_str().trim_end_matches(['.', ',']);

    let normalized = match (raw.rfind(','), raw.rfind('.')) {
        // 1.250,00
        (Some(comma), Some(dot)) if comma > dot => raw.replace('.', "").replace(',', "."),
        // 1,250.00
        (Some(_), Some(_)) => raw.replace(',', ""),
        // 299,99 or 1,250,000
        (Some(_), None) => {
            if raw.matches(',').count() == 1 {
                raw.replace(',', ".")
            } else {
                raw.replace(',', "")
            }
        }
        // 1.250 or 12.50 or 1.250.000
        (None, Some(dot)) => {
            let decimals = raw.len() - dot - 1;
            if raw.matches('.').count() > 1 || decimals == 3 {
                raw.replace('.', "")
            } else {
                raw.to_string()
            }
        }
        (None, None) => raw.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True for lazy-load stand-ins rather than real photos.
pub fn is_placeholder_image(src: &str) -> bool {
    let lower = src.to_lowercase();
    lower.starts_with("data:") || lower.contains("placeholder")
}

/// Extracts listings and listing details for one platform's markup.
pub struct Extractor<'r> {
    platform: Platform,
    base: Option<Url>,
    rules: &'r ExtractionRules,
}

impl<'r> Extractor<'r> {
    /// Creates an extractor. Relative links are resolved against `base_url`.
    pub fn new(platform: Platform, base_url: &str, rules: &'r ExtractionRules) -> Self {
        Self { platform, base: Url::parse(base_url).ok(), rules }
    }

    /// Extracts every valid listing on a results page, in page order.
    pub fn extract_listings(&self, document: &Html) -> Vec<Listing> {
        let scraped_at = Utc::now();
        let candidates = self.candidates(document);

        let mut seen = HashSet::new();
        let listings: Vec<Listing> = candidates
            .into_iter()
            .filter_map(|candidate| self.extract_candidate(candidate, scraped_at))
            .filter(Listing::is_valid)
            .filter(|listing| {
                // Nested containers can surface the same ad twice
                let key = listing.listing_id.clone().or_else(|| listing.link.clone());
                key.is_none_or(|k| seen.insert(k))
            })
            .collect();

        debug!("Extracted {} valid {} listings", listings.len(), self.platform);
        listings
    }

    /// Runs the strategy chain and returns the first non-empty candidate set.
    pub fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let root = document.root_element();

        for strategy in &self.rules.strategies {
            let found = strategy.locator.find(root);
            if found.is_empty() {
                debug!("{}: strategy '{}' found no candidates", self.platform, strategy.name);
                continue;
            }
            debug!("{}: strategy '{}' found {} candidates", self.platform, strategy.name, found.len());
            return found;
        }

        debug!("{}: every candidate strategy came up empty", self.platform);
        Vec::new()
    }

    /// Builds a listing from one candidate. `None` when it has neither title nor link.
    fn extract_candidate(
        &self,
        candidate: ElementRef<'_>,
        scraped_at: DateTime<Utc>,
    ) -> Option<Listing> {
        let rules = self.rules;

        let title = first_value(candidate, &rules.title, |_| true);
        let strip = rules.strip_link_query;
        let link = first_value(candidate, &rules.link, |href| self.resolve(href, strip).is_some())
            .and_then(|href| self.resolve(&href, strip));

        if title.is_none() && link.is_none() {
            trace!("Skipping candidate without title and link");
            return None;
        }

        if let Some(t) = &title {
            if rules.placeholder_titles.iter().any(|p| p.eq_ignore_ascii_case(t)) {
                trace!("Skipping placeholder card '{}'", t);
                return None;
            }
        }

        let listing_id = self.listing_id(candidate, link.as_deref());
        let price_text = first_value(candidate, &rules.price, |_| true);
        let price = price_text.as_deref().and_then(parse_price);
        let photos: Vec<String> =
            first_value(candidate, &rules.photo, |src| !is_placeholder_image(src))
                .and_then(|src| self.resolve(&src, false))
                .into_iter()
                .collect();
        let location = first_value(candidate, &rules.location, |_| true);

        let metadata: BTreeMap<String, String> = rules
            .extras
            .iter()
            .filter_map(|(key, field_rules)| {
                first_value(candidate, field_rules, |_| true).map(|v| (key.to_string(), v))
            })
            .collect();

        Some(Listing {
            title: title.unwrap_or_default(),
            price,
            price_text,
            description: None,
            link,
            photos,
            location,
            category: None,
            posted_date: None,
            seller_name: None,
            seller_type: None,
            listing_id,
            scraped_at,
            source: self.platform,
            metadata,
        })
    }

    /// Augments a listing with what its own page shows. Each field is best-effort.
    pub fn extract_details(&self, document: &Html, mut listing: Listing) -> Listing {
        let root = document.root_element();
        let details = &self.rules.details;

        // Listings opened by URL alone get their title from the page heading
        if listing.title.trim().is_empty() {
            if let Some(heading) = root.select(&HEADING).next() {
                listing.title = normalize_text(&heading.text().collect::<String>());
            }
        }

        if let Some(description) = first_value(root, &details.description, |_| true) {
            listing.description = Some(description);
        }

        let gallery = self.gallery(root, &details.gallery);
        if !gallery.is_empty() {
            listing.photos = gallery;
        }

        if let Some(seller) = first_value(root, &details.seller_name, |_| true) {
            listing.seller_name = Some(seller);
        }
        if let Some(category) = first_value(root, &details.category, |_| true) {
            listing.category = Some(category);
        }
        if let Some(posted) = first_value(root, &details.posted_date, |_| true) {
            listing.posted_date = Some(posted);
        }

        listing
    }

    /// All distinct photos in the first gallery container present.
    fn gallery(&self, root: ElementRef<'_>, containers: &[Locator]) -> Vec<String> {
        let Some(container) = containers.iter().find_map(|c| c.find(root).into_iter().next())
        else {
            return Vec::new();
        };

        let mut photos: Vec<String> = Vec::new();
        for img in container.select(&IMG) {
            let src = ["src", "data-src"]
                .iter()
                .filter_map(|attr| img.value().attr(attr))
                .map(str::trim)
                .find(|src| !src.is_empty() && !is_placeholder_image(src))
                .and_then(|src| self.resolve(src, false));

            if let Some(src) = src {
                if !photos.contains(&src) {
                    photos.push(src);
                }
            }
        }
        photos
    }

    fn listing_id(&self, candidate: ElementRef<'_>, link: Option<&str>) -> Option<String> {
        let from_attr = self
            .rules
            .id_attr
            .and_then(|attr| candidate.value().attr(attr))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from);

        from_attr.or_else(|| self.rules.id_from_link(link?))
    }

    /// Makes an href absolute. `None` for fragments, scripts and junk.
    fn resolve(&self, href: &str, strip_query: bool) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }

        let mut url = match &self.base {
            Some(base) => base.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        if strip_query {
            url.set_query(None);
            url.set_fragment(None);
        }
        Some(url.to_string())
    }
}
