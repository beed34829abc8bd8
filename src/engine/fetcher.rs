//! HTTP fetching with pacing, identity rotation and exponential backoff.

use crate::config::ScraperConfig;
use crate::engine::rate_limiter::RateLimiter;
use crate::engine::stats::RunStatistics;
use crate::error::{AttemptError, FetchError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use wreq::{Client, Method};
use wreq_util::Emulation;

/// One HTTP attempt, fully resolved.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Performs a single HTTP attempt - enables mocking for tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request. Non-2xx statuses are errors.
    async fn send(&self, request: &FetchRequest) -> Result<FetchedPage, AttemptError>;
}

/// Real transport with browser TLS fingerprint emulation.
pub struct WreqTransport {
    client: Client,
}

impl WreqTransport {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for WreqTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchedPage, AttemptError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .emulation(Emulation::Chrome131)
            .timeout(request.timeout)
            .header("User-Agent", request.user_agent.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response =
            builder.send().await.map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        debug!("Response status: {}", status);
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let url = response.uri().to_string();
        let body = response.text().await.map_err(|e| AttemptError::Network(e.to_string()))?;

        Ok(FetchedPage { url, status: status.as_u16(), body })
    }
}

/// Fetches URLs with bounded retries, one rate-limited attempt at a time.
pub struct RetryingFetcher<T> {
    transport: T,
    limiter: Arc<RateLimiter>,
    stats: Arc<RunStatistics>,
    user_agents: Vec<String>,
    headers: BTreeMap<String, String>,
    max_retries: u32,
    retry_delay: Duration,
    backoff_factor: f64,
    timeout: Duration,
}

impl<T: Transport> RetryingFetcher<T> {
    /// Creates a fetcher. The config is expected to be validated already.
    pub fn new(
        transport: T,
        config: &ScraperConfig,
        limiter: Arc<RateLimiter>,
        stats: Arc<RunStatistics>,
    ) -> Self {
        let user_agents =
            config.user_agents.iter().filter(|ua| !ua.trim().is_empty()).cloned().collect();

        Self {
            transport,
            limiter,
            stats,
            user_agents,
            headers: config.default_headers.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            backoff_factor: config.backoff_factor,
            timeout: config.request_timeout(),
        }
    }

    /// GETs a URL.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_with(Method::GET, url).await
    }

    /// Issues up to `max_retries + 1` attempts, each preceded by the rate limiter.
    ///
    /// Every attempt counts as a request; the final outcome counts once as
    /// either a success or a failure.
    pub async fn fetch_with(&self, method: Method, url: &str) -> Result<FetchedPage, FetchError> {
        let attempts = self.max_retries + 1;
        let mut attempt = 1;

        loop {
            self.limiter.wait().await;

            let request = FetchRequest {
                method: method.clone(),
                url: url.to_string(),
                user_agent: self.pick_user_agent(),
                headers: self.headers.clone(),
                timeout: self.timeout,
            };

            debug!("{} {} (attempt {}/{})", request.method, url, attempt, attempts);
            self.stats.record_request();

            let last = match self.transport.send(&request).await {
                Ok(page) => {
                    self.stats.record_success();
                    return Ok(page);
                }
                Err(e) => e,
            };

            if attempt > self.max_retries {
                error!("Giving up on {} after {} attempts: {}", url, attempt, last);
                self.stats.record_failure();
                return Err(FetchError::Exhausted { url: url.to_string(), attempts: attempt, last });
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:.1}s",
                attempt,
                attempts,
                url,
                last,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Pause after the given failed attempt: `retry_delay * backoff_factor^(attempt - 1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.retry_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn pick_user_agent(&self) -> String {
        if self.user_agents.is_empty() {
            return String::new();
        }
        let index = rand::rng().random_range(0..self.user_agents.len());
        self.user_agents[index].clone()
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays scripted outcomes and records every request it sees.
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<FetchedPage, AttemptError>>>,
        fallback: Result<FetchedPage, AttemptError>,
        seen: Mutex<Vec<(FetchRequest, Instant)>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<FetchedPage, AttemptError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                fallback: Err(AttemptError::Status(503)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn always_failing() -> Self {
            Self::new(Vec::new())
        }

        fn attempts(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for Arc<ScriptedTransport> {
        async fn send(&self, request: &FetchRequest) -> Result<FetchedPage, AttemptError> {
            self.seen.lock().unwrap().push((request.clone(), Instant::now()));
            let next = self.outcomes.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn ok_page(body: &str) -> Result<FetchedPage, AttemptError> {
        Ok(FetchedPage { url: "http://test".to_string(), status: 200, body: body.to_string() })
    }

    fn fast_config() -> ScraperConfig {
        ScraperConfig {
            requests_per_second: 1000.0,
            min_delay: 0.0,
            max_delay: 0.0,
            retry_delay: 1.0,
            backoff_factor: 2.0,
            max_retries: 3,
            ..ScraperConfig::default()
        }
    }

    fn fetcher(
        transport: Arc<ScriptedTransport>,
        config: &ScraperConfig,
    ) -> RetryingFetcher<Arc<ScriptedTransport>> {
        let limiter = Arc::new(RateLimiter::from_config(config));
        RetryingFetcher::new(transport, config, limiter, Arc::new(RunStatistics::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok_page("<html>ok</html>")]));
        let fetcher = fetcher(Arc::clone(&transport), &fast_config());

        let page = fetcher.fetch("http://test/a").await.unwrap();
        assert_eq!(page.body, "<html>ok</html>");

        let snap = fetcher.stats().snapshot();
        assert_eq!((snap.requests, snap.successful, snap.failed), (1, 1, 0));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_makes_exactly_four_attempts() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let fetcher = fetcher(Arc::clone(&transport), &fast_config());

        let err = fetcher.fetch("http://test/down").await.unwrap_err();
        assert_eq!(err.attempts(), 4);
        assert!(err.to_string().contains("HTTP status 503"));
        assert_eq!(transport.attempts(), 4);

        let snap = fetcher.stats().snapshot();
        assert_eq!((snap.requests, snap.successful, snap.failed), (4, 0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_grow_geometrically() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let fetcher = fetcher(Arc::clone(&transport), &fast_config());

        let _ = fetcher.fetch("http://test/down").await;

        let seen = transport.seen.lock().unwrap();
        let gaps: Vec<u128> = seen.windows(2).map(|w| (w[1].1 - w[0].1).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000]);
    }

    #[test]
    fn test_backoff_delay_formula() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let config = ScraperConfig { retry_delay: 5.0, backoff_factor: 2.0, ..fast_config() };
        let fetcher = fetcher(transport, &config);

        assert_eq!(fetcher.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(fetcher.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(fetcher.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(fetcher.backoff_delay(200), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(AttemptError::Network("connection reset".to_string())),
            Err(AttemptError::Status(429)),
            ok_page("third time lucky"),
        ]));
        let fetcher = fetcher(Arc::clone(&transport), &fast_config());

        let page = fetcher.fetch("http://test/flaky").await.unwrap();
        assert_eq!(page.body, "third time lucky");

        let snap = fetcher.stats().snapshot();
        assert_eq!((snap.requests, snap.successful, snap.failed), (3, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_once() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let config = ScraperConfig { max_retries: 0, ..fast_config() };
        let fetcher = fetcher(Arc::clone(&transport), &config);

        assert_eq!(fetcher.fetch("http://test/down").await.unwrap_err().attempts(), 1);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_carries_pool_agent_and_headers() {
        let transport = Arc::new(ScriptedTransport::always_failing());
        let config = fast_config();
        let fetcher = fetcher(Arc::clone(&transport), &config);

        let _ = fetcher.fetch("http://test/down").await;

        let pool: HashSet<&String> = config.user_agents.iter().collect();
        for (request, _) in transport.seen.lock().unwrap().iter() {
            assert!(pool.contains(&request.user_agent));
            assert_eq!(request.headers, config.default_headers);
            assert_eq!(request.method, Method::GET);
            assert_eq!(request.timeout, Duration::from_secs(30));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_paced_by_limiter() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok_page("a"), ok_page("b")]));
        let config = ScraperConfig { requests_per_second: 0.5, ..fast_config() };
        let fetcher = fetcher(Arc::clone(&transport), &config);

        let start = Instant::now();
        fetcher.fetch("http://test/1").await.unwrap();
        fetcher.fetch("http://test/2").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    fn wiremock_config() -> ScraperConfig {
        ScraperConfig {
            requests_per_second: 1000.0,
            min_delay: 0.0,
            max_delay: 0.0,
            retry_delay: 0.0,
            max_retries: 1,
            ..ScraperConfig::default()
        }
    }

    fn real_fetcher(config: &ScraperConfig) -> RetryingFetcher<WreqTransport> {
        let transport = WreqTransport::new(config).unwrap();
        let limiter = Arc::new(RateLimiter::from_config(config));
        RetryingFetcher::new(transport, config, limiter, Arc::new(RunStatistics::new()))
    }

    #[tokio::test]
    async fn test_wreq_transport_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/annunci-italia"))
            .and(header("DNT", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>annunci</html>"))
            .mount(&mock_server)
            .await;

        let fetcher = real_fetcher(&wiremock_config());
        let url = format!("{}/annunci-italia", mock_server.uri());

        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.body.contains("annunci"));
    }

    #[tokio::test]
    async fn test_wreq_transport_retries_server_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sch/i.html"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let fetcher = real_fetcher(&wiremock_config());
        let url = format!("{}/sch/i.html", mock_server.uri());

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(fetcher.stats().snapshot().requests, 2);
        assert_eq!(fetcher.stats().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_wreq_transport_404_is_an_attempt_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing.htm"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let config = wiremock_config();
        let transport = WreqTransport::new(&config).unwrap();
        let request = FetchRequest {
            method: Method::GET,
            url: format!("{}/missing.htm", mock_server.uri()),
            user_agent: config.user_agents[0].clone(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };

        assert_eq!(transport.send(&request).await.unwrap_err(), AttemptError::Status(404));
    }

    #[tokio::test]
    async fn test_wreq_transport_connection_refused_is_network_error() {
        let config = wiremock_config();
        let transport = WreqTransport::new(&config).unwrap();
        let request = FetchRequest {
            method: Method::GET,
            url: "http://127.0.0.1:1/".to_string(),
            user_agent: config.user_agents[0].clone(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };

        assert!(matches!(transport.send(&request).await, Err(AttemptError::Network(_))));
    }
}
