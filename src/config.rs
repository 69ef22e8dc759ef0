use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the Insider client
#[derive(Debug, Clone)]
pub struct InsiderConfig {
    /// Identity sent with every request
    pub user_agent: UserAgent,
    /// Rate limit in requests per second
    pub rate_limit: f64,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Retry behaviour for transport failures and 429 responses
    pub retry: RetryPolicy,
    /// Base URLs for EDGAR services
    pub base_urls: EdgarUrls,
    /// Cache root for daily index files and listing pages
    pub index_cache_dir: PathBuf,
    /// Cache root for filing documents
    pub document_cache_dir: PathBuf,
    /// Number of filings extracted concurrently
    pub concurrency: usize,
    /// What to do when a single daily index file cannot be fetched
    pub index_failure: IndexFailurePolicy,
}

/// Base URLs for EDGAR services
#[derive(Debug, Clone)]
pub struct EdgarUrls {
    /// Base URL for EDGAR archives, without a trailing slash
    pub archives: String,
}

/// Constant-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Longest wait honoured from a `Retry-After` header
    pub max_retry_after: Duration,
}

/// Request identity for SEC fair-access compliance.
///
/// Every request carries `"<company> <id>@<domain>"`, where `id` is freshly generated
/// per request.
#[derive(Debug, Clone)]
pub struct UserAgent {
    pub company: String,
    pub domain: String,
}

/// Handling of a daily index file whose download fails during period resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFailurePolicy {
    /// Fail the whole period.
    #[default]
    Abort,
    /// Log and continue with the remaining days.
    Skip,
}

impl Default for InsiderConfig {
    fn default() -> Self {
        Self {
            user_agent: UserAgent::default(),
            rate_limit: 9.0,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            base_urls: EdgarUrls::default(),
            index_cache_dir: PathBuf::from("masterfiles"),
            document_cache_dir: PathBuf::from("form4_xml"),
            concurrency: 1,
            index_failure: IndexFailurePolicy::default(),
        }
    }
}

impl InsiderConfig {
    /// Creates a config with the given identity and defaults for everything else.
    ///
    /// ```rust
    /// use insiderkit::{InsiderConfig, IndexFailurePolicy};
    ///
    /// let config = InsiderConfig {
    ///     rate_limit: 5.0,
    ///     index_failure: IndexFailurePolicy::Skip,
    ///     ..InsiderConfig::new("Acme Research", "acme.example")
    /// };
    /// assert_eq!(config.user_agent.company, "Acme Research");
    /// ```
    pub fn new(company: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            user_agent: UserAgent::new(company, domain),
            ..Default::default()
        }
    }
}

impl Default for EdgarUrls {
    fn default() -> Self {
        Self {
            archives: "https://www.sec.gov/Archives".to_string(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_retries: 5,
            max_retry_after: Duration::from_secs(10),
        }
    }
}

impl UserAgent {
    const ID_LEN: usize = 21;

    pub fn new(company: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            domain: domain.into(),
        }
    }

    /// Renders the header value with a fresh random identifier.
    pub fn render(&self) -> String {
        let id: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(Self::ID_LEN)
            .collect();
        format!("{} {}@{}", self.company, id, self.domain)
    }
}

impl Default for UserAgent {
    fn default() -> Self {
        Self::new("Sample Company Name", "sampledomain.com")
    }
}
