//! Output formatting for listings (table, JSON, markdown, CSV).

use crate::cache::SearchResult;
use crate::config::OutputFormat;
use crate::models::Listing;
use crate::risk::{self, RiskAssessment};

/// Formats listings and run summaries for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a single listing with every field it has.
    pub fn format_listing(&self, listing: &Listing) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(listing).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_single(listing),
            OutputFormat::Markdown => self.markdown_single(listing),
            OutputFormat::Csv => self.csv_listings(std::slice::from_ref(listing)),
        }
    }

    pub fn format_listings(&self, listings: &[Listing]) -> String {
        if listings.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => Self::csv_header().to_string(),
                _ => "No listings found.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(listings).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => self.table_listings(listings),
            OutputFormat::Markdown => self.markdown_listings(listings),
            OutputFormat::Csv => self.csv_listings(listings),
        }
    }

    /// One-line summary of how a search ended. Empty for JSON and CSV so
    /// machine-readable output stays clean.
    pub fn format_summary(&self, result: &SearchResult) -> String {
        if matches!(self.format, OutputFormat::Json | OutputFormat::Csv) {
            return String::new();
        }

        let mut parts = vec![format!("{}: {} listings", result.platform.label(), result.listings.len())];
        if result.cached {
            parts.push("served from cache".to_string());
        } else {
            parts.push(format!("{} pages", result.pages_fetched));
            if let Some(stop) = result.stop {
                parts.push(format!("stopped: {}", stop));
            }
        }

        if let Some(stats) = result.stats {
            parts.push(format!("{} requests", stats.requests));
            if let Some(rate) = stats.success_rate() {
                parts.push(format!("{:.0}% ok", rate * 100.0));
            }
        }

        parts.join(" | ")
    }

    fn table_single(&self, listing: &Listing) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Title:    {}", listing.title));
        lines.push(format!("Price:    {}", listing.display_price()));
        lines.push(format!("Source:   {}", listing.source.label()));
        let risk = risk::assess(listing);
        lines.push(format!("Risk:     {}", risk_summary(&risk)));
        for reason in &risk.reasons {
            lines.push(format!("          - {}", reason));
        }

        let optional = [
            ("ID:      ", &listing.listing_id),
            ("Link:    ", &listing.link),
            ("Location:", &listing.location),
            ("Category:", &listing.category),
            ("Posted:  ", &listing.posted_date),
            ("Seller:  ", &listing.seller_name),
        ];
        for (label, value) in optional {
            if let Some(value) = value {
                lines.push(format!("{} {}", label, value));
            }
        }

        for (key, value) in &listing.metadata {
            lines.push(format!("{:<9} {}", format!("{}:", key), value));
        }

        if !listing.photos.is_empty() {
            lines.push(format!("Photos:   {}", listing.photos.len()));
        }

        if let Some(description) = &listing.description {
            lines.push(String::new());
            lines.push(description.clone());
        }

        lines.join("\n")
    }

    fn table_listings(&self, listings: &[Listing]) -> String {
        let id_width = 12;
        let price_width = 12;
        let risk_width = 6;
        let location_width = 16;
        let title_width = 50;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<id_width$}  {:<price_width$}  {:<risk_width$}  {:<location_width$}  {}",
            "ID", "Price", "Risk", "Location", "Title"
        ));
        lines.push(format!(
            "{:-<id_width$}  {:-<price_width$}  {:-<risk_width$}  {:-<location_width$}  {:-<title_width$}",
            "", "", "", "", ""
        ));

        for listing in listings {
            lines.push(format!(
                "{:<id_width$}  {:>price_width$}  {:<risk_width$}  {:<location_width$}  {}",
                truncate(listing.listing_id.as_deref().unwrap_or("-"), id_width),
                truncate(&listing.display_price(), price_width),
                risk::assess(listing).level.to_string(),
                truncate(listing.location.as_deref().unwrap_or("-"), location_width),
                truncate(&listing.title, title_width)
            ));
        }

        lines.push(String::new());
        lines.push(format!("Total: {} listings", listings.len()));

        lines.join("\n")
    }

    fn markdown_single(&self, listing: &Listing) -> String {
        let mut lines = vec![format!("## {}", listing.title), String::new()];

        lines.push(format!("- **Price:** {}", listing.display_price()));
        let risk = risk::assess(listing);
        lines.push(format!("- **Risk:** {}", risk_summary(&risk)));
        for reason in &risk.reasons {
            lines.push(format!("  - {}", reason));
        }
        if let Some(link) = &listing.link {
            lines.push(format!("- **Link:** [View on {}]({})", listing.source.label(), link));
        }
        if let Some(location) = &listing.location {
            lines.push(format!("- **Location:** {}", location));
        }
        if let Some(seller) = &listing.seller_name {
            lines.push(format!("- **Seller:** {}", seller));
        }
        for (key, value) in &listing.metadata {
            lines.push(format!("- **{}:** {}", key, value));
        }
        for photo in &listing.photos {
            lines.push(format!("- ![photo]({})", photo));
        }
        if let Some(description) = &listing.description {
            lines.push(String::new());
            lines.push(description.clone());
        }

        lines.join("\n")
    }

    fn markdown_listings(&self, listings: &[Listing]) -> String {
        let mut lines = Vec::new();

        lines.push("| Price | Risk | Location | Title |".to_string());
        lines.push("|-------|------|----------|-------|".to_string());

        for listing in listings {
            let title = truncate(&listing.title, 40).replace('|', "\\|");
            let title = match &listing.link {
                Some(link) => format!("[{}]({})", title, link),
                None => title,
            };
            lines.push(format!(
                "| {} | {} | {} | {} |",
                listing.display_price(),
                risk::assess(listing).level,
                listing.location.as_deref().unwrap_or(""),
                title
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} listings found*", listings.len()));

        lines.join("\n")
    }

    fn csv_header() -> &'static str {
        "id,source,title,price,price_text,location,posted_date,seller,link"
    }

    fn csv_listings(&self, listings: &[Listing]) -> String {
        let mut lines = vec![Self::csv_header().to_string()];

        for listing in listings {
            let field = |value: &Option<String>| value.as_deref().map(csv_escape).unwrap_or_default();
            lines.push(format!(
                "{},{},{},{},{},{},{},{},{}",
                field(&listing.listing_id),
                listing.source,
                csv_escape(&listing.title),
                listing.price.map(|p| p.to_string()).unwrap_or_default(),
                field(&listing.price_text),
                field(&listing.location),
                field(&listing.posted_date),
                field(&listing.seller_name),
                field(&listing.link)
            ));
        }

        lines.join("\n")
    }
}

/// "medium (43/100)"
fn risk_summary(risk: &RiskAssessment) -> String {
    format!("{} ({}/100)", risk.level, risk.score)
}

/// Shortens to `width` characters, ending in "..." when cut.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{StatsSnapshot, StopReason};
    use crate::platforms::Platform;

    fn make_listing() -> Listing {
        let mut listing = Listing::new("iPhone 13 128GB blu", Platform::Subito);
        listing.listing_id = Some("48213".to_string());
        listing.price = Some(450.0);
        listing.price_text = Some("450 €".to_string());
        listing.location = Some("Roma (RM)".to_string());
        listing.link = Some("https://www.subito.it/telefonia/iphone-13-roma-48213.htm".to_string());
        listing
    }

    fn live_result(listings: Vec<Listing>) -> SearchResult {
        SearchResult {
            platform: Platform::Subito,
            listings,
            cached: false,
            stop: Some(StopReason::MaxPages),
            pages_fetched: 2,
            stats: Some(StatsSnapshot { requests: 2, successful: 2, failed: 0, listings_found: 1 }),
        }
    }

    #[test]
    fn test_json_format() {
        let formatter = Formatter::new(OutputFormat::Json);
        let output = formatter.format_listing(&make_listing());
        assert!(output.contains("\"listing_id\": \"48213\""));
        assert!(output.contains("\"price\": 450.0"));
        assert!(output.contains("\"source\": \"subito\""));
    }

    #[test]
    fn test_table_format() {
        let formatter = Formatter::new(OutputFormat::Table);
        let output = formatter.format_listings(&[make_listing()]);
        assert!(output.contains("48213"));
        assert!(output.contains("€450.00"));
        assert!(output.contains("Roma (RM)"));
        assert!(output.contains("Total: 1 listings"));
    }

    #[test]
    fn test_table_single_includes_metadata() {
        let mut listing = make_listing();
        listing.metadata.insert("condition".to_string(), "Nuovo".to_string());
        listing.description = Some("Batteria al 90%".to_string());

        let output = Formatter::new(OutputFormat::Table).format_listing(&listing);
        assert!(output.contains("condition: Nuovo"));
        assert!(output.ends_with("Batteria al 90%"));
    }

    #[test]
    fn test_markdown_links_title() {
        let formatter = Formatter::new(OutputFormat::Markdown);
        let output = formatter.format_listings(&[make_listing()]);
        assert!(output.contains("| Price | Risk | Location | Title |"));
        assert!(output.contains("| €450.00 | low | Roma (RM) |"));
        assert!(output.contains("[iPhone 13 128GB blu](https://www.subito.it/"));
        assert!(output.contains("*1 listings found*"));
    }

    #[test]
    fn test_table_shows_risk_level() {
        let mut cheap = make_listing();
        cheap.price = Some(50.0);
        cheap.seller_name = Some("user991".to_string());
        cheap.description = Some("Pagamento anticipato tramite ricarica".to_string());

        let output = Formatter::new(OutputFormat::Table).format_listings(&[make_listing(), cheap.clone()]);
        let rows: Vec<_> = output.lines().skip(2).take(2).collect();
        assert!(rows[0].contains("  low  "), "row was {:?}", rows[0]);
        assert!(rows[1].contains("  high  "), "row was {:?}", rows[1]);

        // 30 + 35 + 20 + 12
        let single = Formatter::new(OutputFormat::Table).format_listing(&cheap);
        assert!(single.contains("Risk:     high (97/100)"));
        assert!(single.contains("          - Richiesta pagamento anticipato"));

        let markdown = Formatter::new(OutputFormat::Markdown).format_listing(&cheap);
        assert!(markdown.contains("- **Risk:** high (97/100)"));
        assert!(markdown.contains("  - Nome venditore sospetto"));
    }

    #[test]
    fn test_csv_format() {
        let formatter = Formatter::new(OutputFormat::Csv);
        let mut listing = make_listing();
        listing.title = "Divano, 3 posti".to_string();

        let output = formatter.format_listings(&[listing]);
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,source,title"));
        assert!(lines[1].starts_with("48213,subito,\"Divano, 3 posti\",450,450 €,"));
    }

    #[test]
    fn test_empty_listings() {
        assert_eq!(Formatter::new(OutputFormat::Json).format_listings(&[]), "[]");
        assert_eq!(Formatter::new(OutputFormat::Table).format_listings(&[]), "No listings found.");
        assert_eq!(
            Formatter::new(OutputFormat::Csv).format_listings(&[]),
            "id,source,title,price,price_text,location,posted_date,seller,link"
        );
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("città", 10), "città");
        assert_eq!(truncate("perché così è", 8), "perch...");
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("simple"), "simple");
        assert_eq!(csv_escape("with,comma"), "\"with,comma\"");
        assert_eq!(csv_escape("with\"quote"), "\"with\"\"quote\"");
    }

    #[test]
    fn test_summary_for_live_run() {
        let summary = Formatter::new(OutputFormat::Table).format_summary(&live_result(vec![make_listing()]));
        assert_eq!(summary, "Subito.it: 1 listings | 2 pages | stopped: max_pages | 2 requests | 100% ok");
    }

    #[test]
    fn test_summary_for_cached_run() {
        let mut result = live_result(Vec::new());
        result.cached = true;
        result.stats = None;
        let summary = Formatter::new(OutputFormat::Markdown).format_summary(&result);
        assert_eq!(summary, "Subito.it: 0 listings | served from cache");
    }

    #[test]
    fn test_summary_is_empty_for_machine_formats() {
        let result = live_result(Vec::new());
        assert!(Formatter::new(OutputFormat::Json).format_summary(&result).is_empty());
        assert!(Formatter::new(OutputFormat::Csv).format_summary(&result).is_empty());
    }
}
