use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsiderError {
    #[error("Resource not found")]
    NotFound,

    #[error("Access forbidden (treated as missing resource)")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Failed to persist cache entry {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache key {} does not stay under the cache root", .0.display())]
    InvalidCacheKey(PathBuf),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid year: must be 1994 or greater")]
    InvalidYear,

    #[error("Invalid quarter: must be between 1 and 4")]
    InvalidQuarter,

    #[error("Invalid month: must be between 1 and 12")]
    InvalidMonth,
}

impl InsiderError {
    /// Returns `true` for failures scoped to a single filing.
    ///
    /// These are logged and the filing is dropped; everything else aborts the run.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            InsiderError::MalformedDocument(_)
                | InsiderError::MissingField(_)
                | InsiderError::NotFound
                | InsiderError::Forbidden
        )
    }
}

pub type Result<T> = std::result::Result<T, InsiderError>;
