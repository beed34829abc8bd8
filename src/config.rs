//! Layered configuration: TOML file, then `ADSCOUT_*` environment, then CLI flags.

use crate::error::ConfigError;
use crate::platforms::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Per-run scraper configuration. Immutable once a scraper owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Upper bound on request rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Lower bound of the random pause between requests (seconds)
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,

    /// Upper bound of the random pause between requests (seconds)
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay (seconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Multiplier applied to the backoff for each further retry
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Per-attempt timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Rotating pool of User-Agent strings
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Headers sent with every request
    #[serde(default = "default_headers")]
    pub default_headers: BTreeMap<String, String>,

    /// HTML parsing mode
    #[serde(default)]
    pub parser: HtmlParser,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Persist raw pages for debugging
    #[serde(default)]
    pub save_html: bool,

    /// Persist search results as JSON
    #[serde(default)]
    pub save_json: bool,

    /// Directory for debug output
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_requests_per_second() -> f64 {
    0.5
}

fn default_min_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    5.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_request_timeout() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Chrome 131 only, matching the TLS and HTTP/2 fingerprint the transport emulates.
fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; CrOS x86_64 14541.0.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_headers() -> BTreeMap<String, String> {
    [
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
        ("Accept-Language", "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7"),
        ("Cache-Control", "max-age=0"),
        ("DNT", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            backoff_factor: default_backoff_factor(),
            request_timeout: default_request_timeout(),
            user_agents: default_user_agents(),
            default_headers: default_headers(),
            parser: HtmlParser::default(),
            proxy: None,
            save_html: false,
            save_json: false,
            output_dir: default_output_dir(),
        }
    }
}

impl ScraperConfig {
    /// Checks every invariant a scraper relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(ConfigError::RequestsPerSecond(self.requests_per_second));
        }
        if !(self.min_delay.is_finite() && self.min_delay >= 0.0) {
            return Err(ConfigError::MinDelay(self.min_delay));
        }
        if !(self.max_delay.is_finite() && self.max_delay >= self.min_delay) {
            return Err(ConfigError::DelayRange { min: self.min_delay, max: self.max_delay });
        }
        if !(self.retry_delay.is_finite() && self.retry_delay >= 0.0) {
            return Err(ConfigError::RetryDelay(self.retry_delay));
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 0.0) {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        // Every pause must fit in a Duration
        for (field, secs) in [
            ("min_delay", self.min_delay),
            ("max_delay", self.max_delay),
            ("retry_delay", self.retry_delay),
            ("1 / requests_per_second", 1.0 / self.requests_per_second),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::OutOfRange { field, value: secs });
            }
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::RequestTimeout);
        }
        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::EmptyUserAgents);
        }
        Ok(())
    }

    pub fn min_delay(&self) -> Duration {
        seconds(self.min_delay)
    }

    pub fn max_delay(&self) -> Duration {
        seconds(self.max_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Applies `ADSCOUT_*` environment overrides. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Some(v) = env_parse("ADSCOUT_REQUESTS_PER_SECOND") {
            self.requests_per_second = v;
        }
        if let Some(v) = env_parse("ADSCOUT_MIN_DELAY") {
            self.min_delay = v;
        }
        if let Some(v) = env_parse("ADSCOUT_MAX_DELAY") {
            self.max_delay = v;
        }
        if let Some(v) = env_parse("ADSCOUT_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("ADSCOUT_TIMEOUT") {
            self.request_timeout = v;
        }
        if let Ok(proxy) = std::env::var("ADSCOUT_PROXY") {
            self.proxy = Some(proxy);
        }
        self
    }
}

/// Seconds as a `Duration`, saturating at `Duration::MAX` and clamping negatives to zero.
pub(crate) fn seconds(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// How fetched pages are handed to the HTML parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlParser {
    /// Full document parsing (adds missing html/body wrappers)
    #[default]
    Document,
    /// Fragment parsing, for partial pages
    Fragment,
}

/// Cache-aside settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for whole search results (seconds)
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,

    /// TTL for single listings (seconds)
    #[serde(default = "default_listing_ttl")]
    pub listing_ttl_secs: u64,

    /// Where cached entries live. Defaults to `adscout` under the user cache directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_search_ttl() -> u64 {
    3600
}

fn default_listing_ttl() -> u64 {
    7200
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_ttl_secs: default_search_ttl(),
            listing_ttl_secs: default_listing_ttl(),
            dir: None,
        }
    }
}

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Marketplace searched when none is given
    #[serde(default)]
    pub platform: Platform,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Engine settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// JSON file holding abuse reports
    #[serde(default = "default_reports_path")]
    pub reports_path: PathBuf,
}

fn default_reports_path() -> PathBuf {
    PathBuf::from("data/reports.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            format: OutputFormat::default(),
            scraper: ScraperConfig::default(),
            cache: CacheConfig::default(),
            reports_path: default_reports_path(),
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads the first config found: explicit path, `./config.toml`, then
    /// `adscout/config.toml` in the user config directory. Defaults otherwise.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let candidates = std::iter::once(PathBuf::from("config.toml"))
            .chain(dirs::config_dir().map(|dir| dir.join("adscout").join("config.toml")));

        for candidate in candidates {
            if candidate.is_file() {
                debug!("Using config file {}", candidate.display());
                return Self::from_file(candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::new())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Some(platform) = env_parse("ADSCOUT_PLATFORM") {
            self.platform = platform;
        }
        if let Ok(dir) = std::env::var("ADSCOUT_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }

        self.scraper = self.scraper.with_env();
        self
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
