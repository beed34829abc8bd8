//! Price range filter.

use super::Filter;
use crate::models::Listing;

/// Filters listings by numeric price. Listings without one always pass.
pub struct PriceFilter {
    min: Option<f64>,
    max: Option<f64>,
}

impl PriceFilter {
    /// Creates a price filter with optional bounds, both inclusive.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Creates a filter with only a minimum price.
    pub fn min(price: f64) -> Self {
        Self { min: Some(price), max: None }
    }

    /// Creates a filter with only a maximum price.
    pub fn max(price: f64) -> Self {
        Self { min: None, max: Some(price) }
    }
}

impl Filter for PriceFilter {
    fn matches(&self, listing: &Listing) -> bool {
        // "Gratis", "Contattami" and unparsed prices are not excluded
        let Some(price) = listing.price else {
            return true;
        };

        self.min.is_none_or(|min| price >= min) && self.max.is_none_or(|max| price <= max)
    }

    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("Price: €{:.2} - €{:.2}", min, max),
            (Some(min), None) => format!("Price: >= €{:.2}", min),
            (None, Some(max)) => format!("Price: <= €{:.2}", max),
            (None, None) => "Price: any".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::Platform;

    fn priced(price: Option<f64>) -> Listing {
        let mut listing = Listing::new("Divano", Platform::Subito);
        listing.price = price;
        listing
    }

    #[test]
    fn test_max_price_is_inclusive() {
        let filter = PriceFilter::max(500.0);
        assert!(filter.matches(&priced(Some(499.99))));
        assert!(filter.matches(&priced(Some(500.0))));
        assert!(!filter.matches(&priced(Some(500.01))));
    }

    #[test]
    fn test_min_price() {
        let filter = PriceFilter::min(20.0);
        assert!(!filter.matches(&priced(Some(10.0))));
        assert!(filter.matches(&priced(Some(20.0))));
    }

    #[test]
    fn test_unpriced_listing_passes() {
        let mut listing = priced(None);
        listing.price_text = Some("Gratis".to_string());
        assert!(PriceFilter::new(Some(10.0), Some(50.0)).matches(&listing));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(PriceFilter::new(Some(10.0), Some(50.0)).description(), "Price: €10.00 - €50.00");
        assert_eq!(PriceFilter::max(50.0).description(), "Price: <= €50.00");
        assert_eq!(PriceFilter::min(5.0).description(), "Price: >= €5.00");
        assert_eq!(PriceFilter::new(None, None).description(), "Price: any");
    }
}
