use super::Insider;
use super::error::{InsiderError, Result};
use super::index::Period;
use super::options::FilingOptions;
use super::traits::{FilingOperations, IndexOperations};
use crate::parsing::index::FilingDescriptor;
use crate::parsing::ownership::{ExtractedFiling, extract_filing};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};

/// Outcome of extracting a single filing.
#[derive(Debug)]
pub enum Extraction {
    Extracted(ExtractedFiling),
    /// The filing was dropped; the error says why (missing node, malformed document,
    /// or a document that does not exist remotely).
    Skipped(InsiderError),
}

impl Extraction {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Extraction::Skipped(_))
    }

    pub fn into_filing(self) -> Option<ExtractedFiling> {
        match self {
            Extraction::Extracted(filing) => Some(filing),
            Extraction::Skipped(_) => None,
        }
    }
}

/// Turns a per-filing error into a skip, passing run-level errors through.
fn skip_or_abort(filing: &FilingDescriptor, error: InsiderError) -> Result<Extraction> {
    if error.is_skippable() {
        tracing::warn!(
            "Skipping {}_{} ({}): {}",
            filing.cik,
            filing.accession_number,
            filing.form_type,
            error
        );
        Ok(Extraction::Skipped(error))
    } else {
        Err(error)
    }
}

/// Filing operations for [`Insider`].
///
/// Extraction runs through the document cache keyed by `{cik}_{accession}.xml`, so a
/// document is downloaded at most once per cache directory. With `concurrency > 1`
/// documents are fetched in parallel through the same throttle and cache; rows are still
/// returned in input order.
#[async_trait]
impl FilingOperations for Insider {
    /// Extracts one filing.
    ///
    /// # Errors
    ///
    /// Only run-level failures are returned as `Err`: persistence errors, rate limiting or
    /// transport failures that outlived their retries, and unexpected HTTP statuses.
    /// Everything scoped to the filing comes back as `Extraction::Skipped`.
    async fn extract(&self, filing: &FilingDescriptor) -> Result<Extraction> {
        let url = filing.document_url(&self.archives_url);
        let key = filing.document_cache_key();

        let bytes = match self.document_cache.get_or_fetch(&url, &key).await {
            Ok(bytes) => bytes,
            Err(e) => return skip_or_abort(filing, e),
        };

        let document = String::from_utf8_lossy(&bytes);
        match extract_filing(&document, &filing.accession_number) {
            Ok(row) => Ok(Extraction::Extracted(row)),
            Err(e) => skip_or_abort(filing, e),
        }
    }

    async fn extract_all(&self, filings: Vec<FilingDescriptor>) -> Result<Vec<ExtractedFiling>> {
        let total = filings.len();

        let pending: Vec<_> = filings.iter().map(|filing| self.extract(filing)).collect();
        let outcomes: Vec<Extraction> = stream::iter(pending)
            .buffered(self.concurrency)
            .enumerate()
            .map(|(i, outcome)| {
                if (i + 1) % 100 == 0 {
                    tracing::debug!("Parsed {}/{}", i + 1, total);
                }
                outcome
            })
            .try_collect()
            .await?;

        let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
        let rows: Vec<ExtractedFiling> = outcomes
            .into_iter()
            .filter_map(Extraction::into_filing)
            .collect();

        tracing::info!(
            "Extracted {} rows from {} filings ({} skipped)",
            rows.len(),
            total,
            skipped
        );
        Ok(rows)
    }

    async fn collect(
        &self,
        period: Period,
        options: &FilingOptions,
    ) -> Result<Vec<ExtractedFiling>> {
        let filings = self.resolve_filings(period).await?;
        let total = filings.len();
        let filings = options.apply(filings);
        tracing::info!("Filtered {} filings down to {}", total, filings.len());

        self.extract_all(filings).await
    }
}
