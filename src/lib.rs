//! # insiderkit - Form 4 acquisition pipeline for SEC EDGAR
//!
//! insiderkit walks a quarter of EDGAR daily master indexes, keeps the insider
//! transaction filings (Forms 4 and 4/A by default), downloads each composite filing
//! document and extracts a fixed row of ownership fields from its embedded XML.
//!
//! ## Features
//!
//! - **Rate-limited fetcher** - one shared token bucket, constant-delay retries,
//!   per-request user agent, gzip decoding
//! - **Write-once content cache** - index files and filings are fetched at most once per
//!   cache directory, with per-key locking for concurrent workers
//! - **Index parsing** - daily master indexes into [`FilingDescriptor`] values with
//!   normalized accession numbers
//! - **All-or-nothing extraction** - a row is produced only when every field is present
//!
//! ## Basic Usage
//!
//! ```ignore
//! use insiderkit::{FilingOperations, FilingOptions, Insider, Period, Quarter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let insider = Insider::new("Acme Research", "acme.example")?;
//!     let period = Period::new(2022, Quarter::Q2)?;
//!
//!     let rows = insider.collect(period, &FilingOptions::insider_forms()).await?;
//!     for row in rows.iter().take(5) {
//!         println!("{} {} {} {}", row.issuer_ticker, row.a_or_d, row.amount, row.price);
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod core;
mod error;
mod filings;
mod index;
mod options;
pub mod parsing;
mod traits;

pub use cache::{CacheStore, ContentCache, DiskStore, MemoryStore};
pub use config::{EdgarUrls, IndexFailurePolicy, InsiderConfig, RetryPolicy, UserAgent};
pub use self::core::{Fetch, Fetcher, Insider, Throttle};
pub use error::{InsiderError, Result};
pub use filings::Extraction;
pub use index::{Period, Quarter, master_links};
pub use options::{FilingOptions, filter_filings};
pub use parsing::index::{FilingDescriptor, normalize_accession};
pub use parsing::ownership::ExtractedFiling;
pub use traits::{FilingOperations, IndexOperations};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
