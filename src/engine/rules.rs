//! Declarative selector rules consumed by the [`Extractor`](super::Extractor).
//!
//! A platform describes its markup as ordered lists of rules. Every list is
//! evaluated left to right and the first non-empty value wins, so adding a
//! fallback for new markup means appending a rule, not touching the extractor.

use regex_lite::Regex;
use scraper::{ElementRef, Selector};

/// Finds elements relative to a scope element (the document root or a candidate).
#[derive(Debug, Clone)]
pub enum Locator {
    /// Plain CSS selector.
    Css(Selector),
    /// Elements matching `within` whose `class` attribute matches `pattern`.
    Class { within: Selector, pattern: Regex },
    /// Elements matching `within` whose `href` attribute matches `pattern`.
    Href { within: Selector, pattern: Regex },
    /// The scope element itself, optionally only when it has the given tag.
    Itself { tag: Option<&'static str> },
}

impl Locator {
    /// Panics on an invalid selector. Rule tables are static, so this fails on first use.
    pub fn css(selector: &str) -> Self {
        Locator::Css(Selector::parse(selector).unwrap())
    }

    /// Case-insensitive class-name pattern, e.g. `class_pattern("div", "item|listing")`.
    pub fn class_pattern(within: &str, pattern: &str) -> Self {
        Locator::Class {
            within: Selector::parse(within).unwrap(),
            pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
        }
    }

    /// Anchors whose href matches `pattern`.
    pub fn href_pattern(pattern: &str) -> Self {
        Locator::Href {
            within: Selector::parse("a[href]").unwrap(),
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    pub fn itself(tag: Option<&'static str>) -> Self {
        Locator::Itself { tag }
    }

    /// Returns matching elements in document order.
    pub fn find<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Locator::Css(selector) => scope.select(selector).collect(),
            Locator::Class { within, pattern } => scope
                .select(within)
                .filter(|e| e.value().attr("class").is_some_and(|c| pattern.is_match(c)))
                .collect(),
            Locator::Href { within, pattern } => scope
                .select(within)
                .filter(|e| e.value().attr("href").is_some_and(|h| pattern.is_match(h)))
                .collect(),
            Locator::Itself { tag } => {
                if tag.is_none_or(|t| scope.value().name().eq_ignore_ascii_case(t)) {
                    vec![scope]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// What to read from a located element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// Whitespace-normalized text content.
    Text,
    /// An attribute value.
    Attr(&'static str),
}

/// Which located element is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pick {
    #[default]
    First,
    Last,
}

/// One selector rule for a single field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub locator: Locator,
    pub value: Value,
    pub pick: Pick,
}

impl FieldRule {
    pub fn text(locator: Locator) -> Self {
        Self { locator, value: Value::Text, pick: Pick::First }
    }

    pub fn attr(locator: Locator, name: &'static str) -> Self {
        Self { locator, value: Value::Attr(name), pick: Pick::First }
    }

    /// Prefer the last match (e.g. the deepest breadcrumb).
    pub fn last(mut self) -> Self {
        self.pick = Pick::Last;
        self
    }

    /// Non-empty values this rule yields, in pick order.
    pub fn values(&self, scope: ElementRef<'_>) -> Vec<String> {
        let mut found = self.locator.find(scope);
        if self.pick == Pick::Last {
            found.reverse();
        }
        found.into_iter().filter_map(|e| read_value(e, self.value)).collect()
    }
}

/// First non-empty value across an ordered rule list that also passes `accept`.
pub fn first_value(
    scope: ElementRef<'_>,
    rules: &[FieldRule],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    rules.iter().flat_map(|rule| rule.values(scope)).find(|v| accept(v))
}

fn read_value(element: ElementRef<'_>, value: Value) -> Option<String> {
    let raw = match value {
        Value::Text => normalize_text(&element.text().collect::<String>()),
        Value::Attr(name) => element.value().attr(name)?.trim().to_string(),
    };
    (!raw.is_empty()).then_some(raw)
}

/// Collapses runs of whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One candidate-selection strategy in a platform's fallback chain.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: &'static str,
    pub locator: Locator,
}

impl Strategy {
    pub fn new(name: &'static str, locator: Locator) -> Self {
        Self { name, locator }
    }
}

/// Field rules for a listing's own page.
#[derive(Debug, Clone, Default)]
pub struct DetailRules {
    pub description: Vec<FieldRule>,
    /// Gallery containers; images are read from the first one present.
    pub gallery: Vec<Locator>,
    pub seller_name: Vec<FieldRule>,
    pub category: Vec<FieldRule>,
    pub posted_date: Vec<FieldRule>,
}

/// Everything the extractor needs to know about one platform's markup.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    /// Candidate strategies, most specific first. The first non-empty one wins.
    pub strategies: Vec<Strategy>,
    pub title: Vec<FieldRule>,
    pub link: Vec<FieldRule>,
    pub price: Vec<FieldRule>,
    pub photo: Vec<FieldRule>,
    pub location: Vec<FieldRule>,
    /// Candidate attribute carrying the platform id.
    pub id_attr: Option<&'static str>,
    /// Pattern with one capture group that pulls the id out of the link.
    pub id_pattern: Option<Regex>,
    /// Extra fields stored in `Listing::metadata` under the given key.
    pub extras: Vec<(&'static str, Vec<FieldRule>)>,
    /// Drop tracking query strings from links.
    pub strip_link_query: bool,
    /// Titles (compared case-insensitively) that mark filler cards rather than ads.
    pub placeholder_titles: Vec<&'static str>,
    pub details: DetailRules,
}

impl ExtractionRules {
    /// Pulls the platform id out of a listing link with `id_pattern`.
    pub fn id_from_link(&self, link: &str) -> Option<String> {
        let caps = self.id_pattern.as_ref()?.captures(link)?;
        caps.get(1).map(|m| m.as_str().to_string())
    }
}
