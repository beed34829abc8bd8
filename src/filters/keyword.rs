//! Keyword-based title filtering.

use super::Filter;
use crate::models::Listing;

/// Filters listings by words in the title, case-insensitively.
pub struct KeywordFilter {
    /// Keywords that must all appear in the title.
    required: Vec<String>,
    /// Keywords that must NOT appear in the title.
    excluded: Vec<String>,
}

impl KeywordFilter {
    /// Creates a keyword filter. Blank words are dropped.
    pub fn new(required: Vec<String>, excluded: Vec<String>) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self { required: lower(required), excluded: lower(excluded) }
    }

    /// Creates a filter with only required keywords.
    pub fn required(keywords: Vec<String>) -> Self {
        Self::new(keywords, Vec::new())
    }

    /// Creates a filter with only excluded keywords.
    pub fn excluded(keywords: Vec<String>) -> Self {
        Self::new(Vec::new(), keywords)
    }
}

impl Filter for KeywordFilter {
    fn matches(&self, listing: &Listing) -> bool {
        let title = listing.title.to_lowercase();
        self.required.iter().all(|k| title.contains(k.as_str()))
            && !self.excluded.iter().any(|k| title.contains(k.as_str()))
    }

    fn description(&self) -> String {
        let mut parts = Vec::new();
        if !self.required.is_empty() {
            parts.push(format!("Must contain: {}", self.required.join(", ")));
        }
        if !self.excluded.is_empty() {
            parts.push(format!("Must not contain: {}", self.excluded.join(", ")));
        }

        if parts.is_empty() {
            "Keywords: any".to_string()
        } else {
            parts.join("; ")
        }
    }
}
