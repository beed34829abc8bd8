//! adscout - classified-ad search CLI for Subito.it and eBay.it
//!
//! Polite, rate-limited scraping with layered configuration.

use adscout::commands::{DetailsCommand, ReportCommand, SearchCommand, SearchOptions};
use adscout::config::{Config, OutputFormat};
use adscout::models::{Condition, SearchQuery};
use adscout::platforms::Platform;
use adscout::reports::{NewReport, ReportStatus};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "adscout",
    version,
    about = "Classified-ad search for Subito.it and eBay.it",
    long_about = "Searches Italian classified-ad marketplaces with polite pacing, retries and a per-platform selector fallback chain."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (table, json, markdown, csv)
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "ADSCOUT_PROXY")]
    proxy: Option<String>,

    /// Save every fetched results page under the output directory
    #[arg(long, global = true)]
    save_html: bool,

    /// Skip the result cache for this run
    #[arg(long, global = true)]
    no_cache: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// One marketplace or all of them.
#[derive(Debug, Clone)]
enum PlatformChoice {
    One(Platform),
    All,
}

impl PlatformChoice {
    fn platforms(&self) -> Vec<Platform> {
        match self {
            PlatformChoice::One(platform) => vec![*platform],
            PlatformChoice::All => Platform::all().to_vec(),
        }
    }
}

impl FromStr for PlatformChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(PlatformChoice::All);
        }
        s.parse().map(PlatformChoice::One).map_err(|_| {
            format!("Unknown platform: {}. Use: subito, ebay, all", s)
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search listings
    #[command(alias = "s")]
    Search {
        /// Search query
        query: String,

        /// Marketplace to search (subito, ebay, all)
        #[arg(short, long)]
        platform: Option<PlatformChoice>,

        /// Category slug (e.g. telefonia)
        #[arg(long)]
        category: Option<String>,

        /// Region (e.g. lombardia)
        #[arg(long)]
        region: Option<String>,

        /// Maximum price in euro
        #[arg(long)]
        max_price: Option<f64>,

        /// Minimum price in euro
        #[arg(long)]
        min_price: Option<f64>,

        /// Item condition (new, used)
        #[arg(long)]
        condition: Option<Condition>,

        /// Number of result pages to scrape (1-5)
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Required keywords in title (comma-separated)
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,

        /// Excluded keywords from title (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Option<Vec<String>>,

        /// Also fetch every listing's own page
        #[arg(long)]
        details: bool,

        /// Write the results to a timestamped JSON file
        #[arg(long)]
        save_json: bool,
    },

    /// Show a single listing by URL
    #[command(alias = "d")]
    Details {
        /// Listing URL on subito.it or ebay.it
        url: String,
    },

    /// Manage abuse reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// List supported platforms
    Platforms,
}

#[derive(Subcommand)]
enum ReportAction {
    /// File a report against a listing
    Create {
        /// Listing id
        listing_id: String,

        /// Listing URL
        url: String,

        /// What is wrong with the listing (10-1000 characters)
        reason: String,

        /// Reporter email
        #[arg(long)]
        email: Option<String>,

        /// Anything else worth knowing
        #[arg(long)]
        info: Option<String>,
    },

    /// List reports, newest first
    List {
        #[arg(long)]
        status: Option<ReportStatus>,

        /// Only reports for this listing id
        #[arg(long)]
        listing: Option<String>,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show one report
    Show { report_id: String },

    /// Count reports by status
    Stats,

    /// Change a report's status
    Status { report_id: String, status: ReportStatus },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = Config::load(cli.config.as_deref())?.with_env();

    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(proxy) = cli.proxy {
        config.scraper.proxy = Some(proxy);
    }
    if cli.save_html {
        config.scraper.save_html = true;
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }

    match cli.command {
        Commands::Search {
            query,
            platform,
            category,
            region,
            max_price,
            min_price,
            condition,
            pages,
            keywords,
            exclude,
            details,
            save_json,
        } => {
            let mut search = SearchQuery::new(query).max_pages(pages);
            if let Some(category) = category {
                search = search.category(category);
            }
            if let Some(region) = region {
                search = search.region(region);
            }
            if let Some(max_price) = max_price {
                search = search.max_price(max_price);
            }
            if let Some(condition) = condition {
                search = search.condition(condition);
            }

            let platforms =
                platform.map(|p| p.platforms()).unwrap_or_else(|| vec![config.platform]);

            let mut options = SearchOptions::new(search, platforms);
            options.min_price = min_price;
            options.keywords = keywords.unwrap_or_default();
            options.exclude_keywords = exclude.unwrap_or_default();
            options.details = details;

            if save_json {
                config.scraper.save_json = true;
            }

            let cmd = SearchCommand::new(config);
            let output = cmd.execute(&options).await?;
            println!("{}", output);
        }

        Commands::Details { url } => {
            let cmd = DetailsCommand::new(config);
            let output = cmd.execute(&url).await?;
            println!("{}", output);
        }

        Commands::Report { action } => {
            let cmd = ReportCommand::new(&config)?;

            let output = match action {
                ReportAction::Create { listing_id, url, reason, email, info } => {
                    let mut report = NewReport::new(listing_id, url, reason);
                    if let Some(email) = email {
                        report = report.reporter_email(email);
                    }
                    if let Some(info) = info {
                        report = report.additional_info(info);
                    }
                    cmd.create(report)?
                }
                ReportAction::List { status, listing, limit } => {
                    cmd.list(status, listing.as_deref(), limit)?
                }
                ReportAction::Show { report_id } => cmd.show(&report_id)?,
                ReportAction::Stats => cmd.stats()?,
                ReportAction::Status { report_id, status } => cmd.set_status(&report_id, status)?,
            };

            println!("{}", output);
        }

        Commands::Platforms => {
            println!("Supported platforms:\n");
            println!("{:<8} {:<12} {}", "Code", "Name", "Base URL");
            println!("{:-<8} {:-<12} {:-<24}", "", "", "");

            for platform in Platform::all() {
                println!("{:<8} {:<12} {}", platform.to_string(), platform.label(), platform.base_url());
            }
        }
    }

    Ok(())
}
