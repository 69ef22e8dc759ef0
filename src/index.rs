//! Period resolution over EDGAR daily master indexes.
//!
//! Each quarter has a daily-index directory (`.../daily-index/<YEAR>/QTR<1-4>/`) whose
//! HTML listing links one `master.<YYYYMMDD>.idx` file per business day. Resolving a
//! period means scanning that listing for anchors whose text starts with `master.`,
//! downloading every linked index file through the index cache, and concatenating the
//! parsed rows in listing order.
//!
//! # Examples
//!
//! ```ignore
//! use insiderkit::{IndexOperations, Insider, Period, Quarter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let insider = Insider::new("Acme Research", "acme.example")?;
//!     let period = Period::new(2022, Quarter::Q2)?;
//!     let filings = insider.resolve_filings(period).await?;
//!     println!("{} filings", filings.len());
//!     Ok(())
//! }
//! ```

use super::Insider;
use super::config::IndexFailurePolicy;
use super::error::{InsiderError, Result};
use super::traits::IndexOperations;
use crate::parsing::index::{FilingDescriptor, IndexConfig, IndexParser};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use scraper::{Html, Selector};
use std::path::{Component, Path, PathBuf};
use url::Url;

const MASTER_PREFIX: &str = "master.";

/// Calendar quarter (Q1-Q4).
///
/// EDGAR index directories are grouped by quarter (`QTR1` .. `QTR4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quarter {
    Q1 = 1,
    Q2 = 2,
    Q3 = 3,
    Q4 = 4,
}

impl Quarter {
    /// Creates a Quarter from a month number (1-12)
    pub fn from_month(month: u32) -> Result<Self> {
        match month {
            1..=3 => Ok(Quarter::Q1),
            4..=6 => Ok(Quarter::Q2),
            7..=9 => Ok(Quarter::Q3),
            10..=12 => Ok(Quarter::Q4),
            _ => Err(InsiderError::InvalidMonth),
        }
    }

    /// Converts the quarter to its integer representation (1-4).
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }
}

impl TryFrom<u32> for Quarter {
    type Error = InsiderError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Quarter::Q1),
            2 => Ok(Quarter::Q2),
            3 => Ok(Quarter::Q3),
            4 => Ok(Quarter::Q4),
            _ => Err(InsiderError::InvalidQuarter),
        }
    }
}

/// A year + quarter used to locate a daily-index directory (year must be 1994 or later).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    year: i32,
    quarter: Quarter,
}

impl Period {
    pub fn new(year: i32, quarter: Quarter) -> Result<Self> {
        if year < 1994 {
            return Err(InsiderError::InvalidYear);
        }
        Ok(Self { year, quarter })
    }

    /// The quarter a calendar date falls in.
    pub fn containing(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), Quarter::from_month(date.month())?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> Quarter {
        self.quarter
    }

    /// Directory marker used in archive paths, e.g. `QTR2`.
    pub fn quarter_dir(&self) -> String {
        format!("QTR{}", self.quarter.as_u32())
    }
}

/// Collects `href`s of anchors whose trimmed text starts with `master.`, resolved
/// against `base`, in document order.
pub fn master_links(html: &str, base: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a")
        .map_err(|e| InsiderError::InvalidResponse(format!("Invalid selector: {}", e)))?;

    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        let text: String = anchor.text().collect();
        if !text.trim().starts_with(MASTER_PREFIX) {
            continue;
        }
        if let Some(href) = anchor.value().attr("href") {
            links.push(base.join(href)?);
        }
    }
    Ok(links)
}

impl Insider {
    /// URL of the daily-index listing page for `period` (with trailing slash).
    pub fn listing_url(&self, period: Period) -> String {
        format!(
            "{}/edgar/daily-index/{}/{}/",
            self.archives_url,
            period.year(),
            period.quarter_dir()
        )
    }

    /// Index cache key for the listing page itself.
    fn listing_cache_key(period: Period) -> PathBuf {
        PathBuf::from(format!(
            "daily-index-{}-{}.html",
            period.year(),
            period.quarter_dir()
        ))
    }

    /// Index cache key for a daily index file: the path after the `QTR<n>/` marker,
    /// falling back to the last path segment.
    ///
    /// Empty segments are dropped, so the key is always relative. A key that would be
    /// empty or climb with `..` is rejected.
    fn index_cache_key(url: &Url, period: Period) -> Result<PathBuf> {
        let marker = format!("{}/", period.quarter_dir());
        let path = url.path();
        let rest = match path.split_once(&marker) {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => path.rsplit('/').next().unwrap_or(path),
        };

        let mut key = PathBuf::new();
        for component in Path::new(rest).components() {
            match component {
                Component::Normal(segment) => key.push(segment),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(InsiderError::InvalidCacheKey(PathBuf::from(rest)));
                }
            }
        }
        if key.as_os_str().is_empty() {
            return Err(InsiderError::InvalidCacheKey(PathBuf::from(path)));
        }
        Ok(key)
    }

    /// Downloads (or reads from cache) and parses a single daily index file.
    async fn daily_filings(&self, url: &Url, period: Period) -> Result<Vec<FilingDescriptor>> {
        let key = Self::index_cache_key(url, period)?;
        let content = self.index_cache.get_or_fetch(url.as_str(), &key).await?;
        IndexParser::new(IndexConfig::default()).parse(&content[..])
    }
}

#[async_trait]
impl IndexOperations for Insider {
    async fn master_index_urls(&self, period: Period) -> Result<Vec<Url>> {
        let listing_url = self.listing_url(period);
        let bytes = self
            .index_cache
            .get_or_fetch(&listing_url, &Self::listing_cache_key(period))
            .await?;
        let html = String::from_utf8_lossy(&bytes);
        let links = master_links(&html, &Url::parse(&listing_url)?)?;

        tracing::info!(
            "Found {} master files for {} {}",
            links.len(),
            period.year(),
            period.quarter_dir()
        );
        Ok(links)
    }

    async fn resolve_filings(&self, period: Period) -> Result<Vec<FilingDescriptor>> {
        let urls = self.master_index_urls(period).await?;

        let mut filings = Vec::new();
        for url in &urls {
            match self.daily_filings(url, period).await {
                Ok(entries) => filings.extend(entries),
                Err(e) if self.index_failure == IndexFailurePolicy::Skip => {
                    tracing::warn!("Skipping daily index {}: {}", url, e);
                }
                Err(e) => {
                    tracing::error!("Failed to load daily index {}: {}", url, e);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Resolved {} filings for {} {}",
            filings.len(),
            period.year(),
            period.quarter_dir()
        );
        Ok(filings)
    }
}
