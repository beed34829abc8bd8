//! Data models for listings and search parameters.

use crate::error::QueryError;
use crate::platforms::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One normalized classified-ad record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Ad title
    pub title: String,
    /// Numeric price, when the price text parsed
    pub price: Option<f64>,
    /// Raw price text as shown ("1.250,00 €", "Gratis", ...)
    pub price_text: Option<String>,
    pub description: Option<String>,
    /// Absolute URL of the ad page
    pub link: Option<String>,
    /// Photo URLs in page order
    #[serde(default)]
    pub photos: Vec<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    /// Posting date exactly as the platform prints it
    pub posted_date: Option<String>,
    pub seller_name: Option<String>,
    pub seller_type: Option<String>,
    /// Platform-assigned identifier
    pub listing_id: Option<String>,
    /// When the record was extracted
    pub scraped_at: DateTime<Utc>,
    /// Marketplace the record came from
    pub source: Platform,
    /// Platform-specific extras (condition, shipping, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Listing {
    /// Creates a listing with only a title; every other field is absent.
    pub fn new(title: impl Into<String>, source: Platform) -> Self {
        Self {
            title: title.into(),
            price: None,
            price_text: None,
            description: None,
            link: None,
            photos: Vec::new(),
            location: None,
            category: None,
            posted_date: None,
            seller_name: None,
            seller_type: None,
            listing_id: None,
            scraped_at: Utc::now(),
            source,
            metadata: BTreeMap::new(),
        }
    }

    /// A listing is valid iff it has a non-empty title and a link or an id.
    pub fn is_valid(&self) -> bool {
        let has = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.trim().is_empty());
        !self.title.trim().is_empty() && (has(&self.link) || has(&self.listing_id))
    }

    /// Price for display: the number if known, else the raw text.
    pub fn display_price(&self) -> String {
        match (self.price, &self.price_text) {
            (Some(price), _) => format!("€{:.2}", price),
            (None, Some(text)) => text.clone(),
            (None, None) => "N/A".to_string(),
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title: String = self.title.chars().take(50).collect();
        write!(
            f,
            "Listing(title='{}', price={}, link={})",
            title,
            self.display_price(),
            self.link.as_deref().unwrap_or("-")
        )
    }
}

/// Item condition filter (only honoured by platforms that support it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "nuovo" => Ok(Condition::New),
            "used" | "usato" => Ok(Condition::Used),
            _ => Err(format!("Unknown condition: {}. Use: new, used", s)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::New => write!(f, "new"),
            Condition::Used => write!(f, "used"),
        }
    }
}

/// Upper bound on pages a single search may request.
pub const MAX_PAGES_LIMIT: u32 = 5;

/// Characters rejected in search text.
const FORBIDDEN_CHARS: [char; 7] = ['<', '>', ';', '&', '|', '$', '`'];

/// Parameters of one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub category: Option<String>,
    pub region: Option<String>,
    pub max_price: Option<f64>,
    pub condition: Option<Condition>,
    pub max_pages: u32,
}

impl SearchQuery {
    /// Creates a one-page search with no filters. Whitespace in the query is collapsed.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into().split_whitespace().collect::<Vec<_>>().join(" "),
            category: None,
            region: None,
            max_price: None,
            condition: None,
            max_pages: 1,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Region names are matched case-insensitively by the platforms.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into().trim().to_lowercase());
        self
    }

    pub fn max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Rejects requests outside the limits a public search endpoint accepts.
    pub fn validate(&self) -> Result<(), QueryError> {
        if !(2..=100).contains(&self.query.chars().count()) {
            return Err(QueryError::Length);
        }
        if let Some(c) = self.query.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(QueryError::InvalidChar(c));
        }
        if let Some(price) = self.max_price {
            if !(price > 0.0 && price <= 1_000_000.0) {
                return Err(QueryError::MaxPrice(price));
            }
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&self.max_pages) {
            return Err(QueryError::MaxPages(self.max_pages));
        }
        if let Some(region) = &self.region {
            if !(3..=50).contains(&region.chars().count()) {
                return Err(QueryError::Region);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_validity() {
        let mut listing = Listing::new("iPhone 13", Platform::Subito);
        assert!(!listing.is_valid());

        listing.link = Some("https://www.subito.it/telefonia/iphone-13-roma-123.htm".to_string());
        assert!(listing.is_valid());

        listing.link = None;
        listing.listing_id = Some("123".to_string());
        assert!(listing.is_valid());

        listing.title = "   ".to_string();
        assert!(!listing.is_valid());
    }

    #[test]
    fn test_listing_blank_link_is_not_a_link() {
        let mut listing = Listing::new("Divano", Platform::Subito);
        listing.link = Some(String::new());
        assert!(!listing.is_valid());
    }

    #[test]
    fn test_display_price() {
        let mut listing = Listing::new("Bici", Platform::Subito);
        assert_eq!(listing.display_price(), "N/A");

        listing.price_text = Some("Gratis".to_string());
        assert_eq!(listing.display_price(), "Gratis");

        listing.price = Some(1250.0);
        assert_eq!(listing.display_price(), "€1250.00");
    }

    #[test]
    fn test_listing_display_truncates_title() {
        let listing = Listing::new("x".repeat(80), Platform::Ebay);
        let shown = listing.to_string();
        assert!(shown.contains(&"x".repeat(50)));
        assert!(!shown.contains(&"x".repeat(51)));
    }

    #[test]
    fn test_listing_serde() {
        let mut listing = Listing::new("Lampada", Platform::Ebay);
        listing.listing_id = Some("42".to_string());
        listing.metadata.insert("condition".to_string(), "Usato".to_string());

        let json = serde_json::to_string(&listing).unwrap();
        assert!(json.contains("\"source\":\"ebay\""));

        let parsed: Listing = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, listing);
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!("new".parse::<Condition>().unwrap(), Condition::New);
        assert_eq!("Usato".parse::<Condition>().unwrap(), Condition::Used);
        assert!("broken".parse::<Condition>().is_err());
    }

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("iphone 13")
            .category("telefonia")
            .region("  Lazio ")
            .max_price(500.0)
            .max_pages(2);

        assert_eq!(query.query, "iphone 13");
        assert_eq!(query.category.as_deref(), Some("telefonia"));
        assert_eq!(query.region.as_deref(), Some("lazio"));
        assert_eq!(query.max_price, Some(500.0));
        assert_eq!(query.max_pages, 2);
        assert!(query.condition.is_none());
    }

    #[test]
    fn test_search_query_collapses_whitespace() {
        assert_eq!(SearchQuery::new("  iphone   13 pro ").query, "iphone 13 pro");
    }

    #[test]
    fn test_search_query_validation() {
        assert!(SearchQuery::new("iphone 13").max_pages(5).validate().is_ok());
        assert_eq!(SearchQuery::new("x").validate(), Err(QueryError::Length));
        assert_eq!(SearchQuery::new("tv & hifi").validate(), Err(QueryError::InvalidChar('&')));
        assert_eq!(
            SearchQuery::new("bici").max_price(0.0).validate(),
            Err(QueryError::MaxPrice(0.0))
        );
        assert_eq!(SearchQuery::new("bici").max_pages(6).validate(), Err(QueryError::MaxPages(6)));
        assert_eq!(SearchQuery::new("bici").max_pages(0).validate(), Err(QueryError::MaxPages(0)));
        assert_eq!(SearchQuery::new("bici").region("VA").validate(), Err(QueryError::Region));
    }
}
