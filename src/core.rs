use async_trait::async_trait;
use flate2::read::GzDecoder;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE, HeaderValue, RETRY_AFTER, USER_AGENT};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::cache::{CacheStore, ContentCache, DiskStore};
use super::config::{IndexFailurePolicy, InsiderConfig, RetryPolicy, UserAgent};
use super::error::{InsiderError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Shared token bucket pacing every outbound request.
///
/// Cloning a `Throttle` shares the underlying bucket, so a single instance handed to
/// several workers still enforces one global rate.
#[derive(Debug, Clone)]
pub struct Throttle {
    governor: Option<Arc<Governor>>,
}

impl Throttle {
    /// Creates a throttle allowing `rate` requests per second, evenly spaced.
    ///
    /// Fractional rates are accepted (`0.5` means one request every two seconds).
    pub fn per_second(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(InsiderError::ConfigError(
                "Rate limit must be greater than zero".to_string(),
            ));
        }
        let out_of_range =
            || InsiderError::ConfigError(format!("Rate limit {} is out of range", rate));
        let period = Duration::try_from_secs_f64(1.0 / rate).map_err(|_| out_of_range())?;
        let quota = Quota::with_period(period).ok_or_else(out_of_range)?;
        Ok(Self {
            governor: Some(Arc::new(RateLimiter::direct(quota))),
        })
    }

    /// A throttle that never waits. Intended for tests and local mirrors.
    pub fn unlimited() -> Self {
        Self { governor: None }
    }

    /// Waits until a token is available.
    pub async fn acquire(&self) {
        if let Some(governor) = &self.governor {
            governor.until_ready().await;
        }
    }
}

/// Source of raw bytes for a URL.
///
/// [`Fetcher`] is the production implementation; tests substitute counting fakes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Result of a single HTTP attempt.
enum Attempt {
    Done(Result<Vec<u8>>),
    Retry {
        error: InsiderError,
        wait: Option<Duration>,
    },
}

/// Rate-limited, retrying HTTP client for EDGAR archives.
///
/// Every attempt first takes a token from the shared [`Throttle`], then issues a GET with
/// a per-request user agent, `accept-language` and `accept-encoding: gzip`. Transport
/// failures and HTTP 429 are retried with a constant delay; 404, 403 and any other status
/// above 299 are returned immediately. A `Retry-After` header on a 429 replaces the delay,
/// capped at [`RetryPolicy::max_retry_after`].
///
/// # Errors
///
/// * `InsiderError::NotFound` - HTTP 404
/// * `InsiderError::Forbidden` - HTTP 403
/// * `InsiderError::RateLimited` - HTTP 429 persisted after all retries
/// * `InsiderError::UnexpectedStatus` - any other status above 299
/// * `InsiderError::Transport` - connection or timeout failure after all retries
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    throttle: Throttle,
    user_agent: UserAgent,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        throttle: Throttle,
        user_agent: UserAgent,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        // Reject identities that cannot be sent as a header up front.
        HeaderValue::from_str(&user_agent.render())
            .map_err(|e| InsiderError::ConfigError(format!("Invalid user agent: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InsiderError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            throttle,
            user_agent,
            retry,
        })
    }

    pub fn from_config(config: &InsiderConfig) -> Result<Self> {
        Self::new(
            Throttle::per_second(config.rate_limit)?,
            config.user_agent.clone(),
            config.retry,
            config.timeout,
        )
    }

    async fn attempt(&self, url: &str) -> Attempt {
        self.throttle.acquire().await;

        let user_agent = match HeaderValue::from_str(&self.user_agent.render()) {
            Ok(value) => value,
            Err(e) => {
                return Attempt::Done(Err(InsiderError::ConfigError(format!(
                    "Invalid user agent: {}",
                    e
                ))));
            }
        };

        let response = match self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry {
                    error: InsiderError::Transport(e),
                    wait: None,
                };
            }
        };

        match response.status() {
            status if status.is_success() => match response.bytes().await {
                Ok(body) => Attempt::Done(decode_body(body.to_vec())),
                Err(e) => Attempt::Retry {
                    error: InsiderError::Transport(e),
                    wait: None,
                },
            },
            StatusCode::NOT_FOUND => {
                tracing::debug!("File not found {}", url);
                Attempt::Done(Err(InsiderError::NotFound))
            }
            StatusCode::FORBIDDEN => {
                tracing::debug!("Access forbidden {}", url);
                Attempt::Done(Err(InsiderError::Forbidden))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Attempt::Retry {
                    error: InsiderError::RateLimited,
                    wait,
                }
            }
            status => {
                tracing::warn!("Got status code {} for url {}", status, url);
                Attempt::Done(Err(InsiderError::UnexpectedStatus(status.as_u16())))
            }
        }
    }
}

#[async_trait]
impl Fetch for Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut retries = 0;

        loop {
            match self.attempt(url).await {
                Attempt::Done(result) => {
                    if let Ok(body) = &result {
                        tracing::debug!(
                            "Downloaded {} ({} bytes) in {:?}",
                            url,
                            body.len(),
                            started.elapsed()
                        );
                    }
                    return result;
                }
                Attempt::Retry { error, wait } => {
                    if retries >= self.retry.max_retries {
                        return Err(error);
                    }
                    let wait = wait
                        .map(|w| w.min(self.retry.max_retry_after))
                        .unwrap_or(self.retry.delay);
                    tracing::warn!(
                        "Request for {} failed: {}. Attempt {}/{}. Retrying in {:?}.",
                        url,
                        error,
                        retries + 1,
                        self.retry.max_retries + 1,
                        wait
                    );
                    sleep(wait).await;
                    retries += 1;
                }
            }
        }
    }
}

/// Inflates gzip bodies; anything without the gzip magic header passes through unchanged.
fn decode_body(body: Vec<u8>) -> Result<Vec<u8>> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Ok(body);
    }
    let mut decoded = Vec::with_capacity(body.len() * 4);
    GzDecoder::new(&body[..])
        .read_to_end(&mut decoded)
        .map_err(|e| InsiderError::InvalidResponse(format!("Failed to decode gzip body: {}", e)))?;
    Ok(decoded)
}

/// Entry point for the insider-filing acquisition pipeline.
///
/// `Insider` owns the explicitly constructed services that the pipeline shares: one
/// [`Fetch`] implementation (normally a [`Fetcher`] with its token bucket) and two
/// [`ContentCache`]s, one for daily index files and one for filing documents. Cloning is
/// cheap and every clone shares the same throttle and cache locks.
///
/// # Examples
///
/// ```ignore
/// use insiderkit::{FilingOperations, FilingOptions, Insider, Period, Quarter};
///
/// let insider = Insider::new("Acme Research", "acme.example")?;
/// let period = Period::new(2022, Quarter::Q2)?;
/// let rows = insider.collect(period, &FilingOptions::insider_forms()).await?;
/// ```
#[derive(Clone)]
pub struct Insider {
    pub(crate) index_cache: ContentCache,
    pub(crate) document_cache: ContentCache,
    pub(crate) archives_url: String,
    pub(crate) concurrency: usize,
    pub(crate) index_failure: IndexFailurePolicy,
}

impl fmt::Debug for Insider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insider")
            .field("archives_url", &self.archives_url)
            .field("concurrency", &self.concurrency)
            .field("index_failure", &self.index_failure)
            .finish_non_exhaustive()
    }
}

impl Insider {
    /// Creates a client with default settings and the given request identity.
    pub fn new(company: &str, domain: &str) -> Result<Self> {
        Self::with_config(InsiderConfig::new(company, domain))
    }

    /// Creates a client backed by a live [`Fetcher`] and on-disk caches.
    pub fn with_config(config: InsiderConfig) -> Result<Self> {
        let fetch: Arc<dyn Fetch> = Arc::new(Fetcher::from_config(&config)?);
        let index_store: Arc<dyn CacheStore> = Arc::new(DiskStore::new(&config.index_cache_dir));
        let document_store: Arc<dyn CacheStore> =
            Arc::new(DiskStore::new(&config.document_cache_dir));
        Self::from_parts(fetch, index_store, document_store, &config)
    }

    /// Assembles a client from injected services.
    ///
    /// Only the archive URL, concurrency and index failure policy are read from `config`.
    pub fn from_parts(
        fetch: Arc<dyn Fetch>,
        index_store: Arc<dyn CacheStore>,
        document_store: Arc<dyn CacheStore>,
        config: &InsiderConfig,
    ) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(InsiderError::ConfigError(
                "Concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            index_cache: ContentCache::new(fetch.clone(), index_store),
            document_cache: ContentCache::new(fetch, document_store),
            archives_url: config.base_urls.archives.trim_end_matches('/').to_string(),
            concurrency: config.concurrency,
            index_failure: config.index_failure,
        })
    }

    /// Returns the base URL for EDGAR archives.
    pub fn archives_url(&self) -> &str {
        &self.archives_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_throttle_rejects_non_positive_rates() {
        assert!(matches!(
            Throttle::per_second(0.0),
            Err(InsiderError::ConfigError(_))
        ));
        assert!(Throttle::per_second(-3.0).is_err());
        assert!(Throttle::per_second(f64::NAN).is_err());
        assert!(matches!(
            Throttle::per_second(1e-30),
            Err(InsiderError::ConfigError(_))
        ));
        assert!(Throttle::per_second(0.5).is_ok());
        assert!(Throttle::per_second(9.0).is_ok());
    }

    #[tokio::test]
    async fn test_throttle_spaces_requests() {
        let throttle = Throttle::per_second(20.0).unwrap();
        let started = Instant::now();
        for _ in 0..3 {
            throttle.acquire().await;
        }
        // First token is immediate, the next two wait ~50ms each.
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_decode_body_gzip_and_plain() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"master index").unwrap();
        let gz = encoder.finish().unwrap();

        assert_eq!(decode_body(gz).unwrap(), b"master index");
        assert_eq!(decode_body(b"plain".to_vec()).unwrap(), b"plain");
    }

    #[test]
    fn test_decode_body_truncated_gzip() {
        let result = decode_body(vec![0x1f, 0x8b, 0x08]);
        assert!(matches!(result, Err(InsiderError::InvalidResponse(_))));
    }

    #[test]
    fn test_debug_omits_services() {
        let insider = Insider::new("Acme Research", "acme.example").unwrap();
        let rendered = format!("{:?}", insider);

        assert!(rendered.starts_with("Insider {"));
        assert!(rendered.contains("https://www.sec.gov/Archives"));
        assert!(rendered.contains("concurrency: 1"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = InsiderConfig {
            concurrency: 0,
            ..InsiderConfig::default()
        };
        let result = Insider::with_config(config);
        assert!(matches!(result, Err(InsiderError::ConfigError(_))));
    }
}
