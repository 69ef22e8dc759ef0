//! Trait definitions organizing pipeline operations by stage.
//!
//! `Insider` implements both traits. Index operations turn a period into filing
//! descriptors; filing operations turn descriptors into extracted rows.

use super::error::Result;
use super::filings::Extraction;
use super::index::Period;
use super::options::FilingOptions;
use crate::parsing::index::FilingDescriptor;
use crate::parsing::ownership::ExtractedFiling;
use async_trait::async_trait;
use url::Url;

/// Operations for discovering and reading daily master indexes.
#[async_trait]
pub trait IndexOperations {
    /// Lists the daily master index URLs linked from the period's listing page.
    async fn master_index_urls(&self, period: Period) -> Result<Vec<Url>>;
    /// Downloads and parses every daily index file of the period, in listing order.
    async fn resolve_filings(&self, period: Period) -> Result<Vec<FilingDescriptor>>;
}

/// Operations for downloading filings and extracting ownership rows.
#[async_trait]
pub trait FilingOperations {
    /// Fetches one filing document and extracts its row, or reports why it was skipped.
    async fn extract(&self, filing: &FilingDescriptor) -> Result<Extraction>;
    /// Extracts rows for the given filings, dropping skipped ones.
    async fn extract_all(&self, filings: Vec<FilingDescriptor>) -> Result<Vec<ExtractedFiling>>;
    /// Resolves, filters and extracts a whole period.
    async fn collect(&self, period: Period, options: &FilingOptions) -> Result<Vec<ExtractedFiling>>;
}
