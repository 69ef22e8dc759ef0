use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::PathBuf;

pub struct IndexConfig {
    /// Leading lines discarded unconditionally.
    pub header_lines: usize,
    pub delimiter: char,
}

impl Default for IndexConfig {
    /// Daily master indexes carry a 7-line preamble and use '|' between fields.
    fn default() -> Self {
        Self {
            header_lines: 7,
            delimiter: '|',
        }
    }
}

pub struct IndexParser {
    config: IndexConfig,
}

/// One row of a daily master index.
///
/// The CIK is kept exactly as written in the index, leading zeros included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingDescriptor {
    pub cik: String,
    pub company_name: String,
    pub form_type: String,
    pub date_filed: String,
    /// Archive-relative path of the composite document, e.g. `edgar/data/320193/0000320193-22-000050.txt`.
    pub file_name: String,
    /// 18-digit accession number derived from `file_name`.
    pub accession_number: String,
}

impl FilingDescriptor {
    /// Absolute URL of the composite document under the given archives base.
    pub fn document_url(&self, archives_url: &str) -> String {
        format!(
            "{}/{}",
            archives_url.trim_end_matches('/'),
            self.file_name.trim_start_matches('/')
        )
    }

    /// Cache key for the filing document: `{cik}_{accession}.xml`.
    pub fn document_cache_key(&self) -> PathBuf {
        PathBuf::from(format!("{}_{}.xml", self.cik, self.accession_number))
    }

    /// Parses `date_filed`, accepting both `YYYY-MM-DD` and `YYYYMMDD`.
    pub fn filed_on(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date_filed, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&self.date_filed, "%Y%m%d"))
            .ok()
    }
}

/// Derives an accession number from a document path.
///
/// Strips a trailing `.txt`, keeps the last `/` segment and removes hyphens, so
/// `edgar/data/1000045/0000950170-23-002704.txt` becomes `000095017023002704`.
/// Already-normalized input is returned unchanged.
pub fn normalize_accession(path: &str) -> String {
    let path = path.strip_suffix(".txt").unwrap_or(path);
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.replace('-', "")
}

/// A parser for EDGAR daily master index files.
///
/// The parser discards the fixed-size preamble, then splits every remaining non-empty
/// line on the delimiter. Lines that do not yield exactly five fields are logged and
/// skipped; they never fail the parse. Output order mirrors file order.
///
/// # Examples
///
/// ```
/// use insiderkit::parsing::index::{IndexConfig, IndexParser};
///
/// let parser = IndexParser::new(IndexConfig { header_lines: 0, ..Default::default() });
/// let entries = parser
///     .parse("1000045|NICHOLAS FINANCIAL INC|10-Q|2023-02-14|edgar/data/1000045/0000950170-23-002704.txt".as_bytes())
///     .unwrap();
/// assert_eq!(entries[0].accession_number, "000095017023002704");
/// ```
impl IndexParser {
    const FIELD_COUNT: usize = 5;

    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    /// Parses raw index bytes into descriptors.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected, since company
    /// names occasionally carry Latin-1 characters.
    ///
    /// # Errors
    ///
    /// Only I/O errors from the reader are returned.
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<Vec<FilingDescriptor>> {
        let mut entries = Vec::new();

        for raw in reader.split(b'\n').skip(self.config.header_lines) {
            let raw = raw?;
            let line = String::from_utf8_lossy(&raw);
            if let Some(entry) = self.parse_line(&line) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// Parses a single index line, or `None` when the line is blank or malformed.
    fn parse_line(&self, line: &str) -> Option<FilingDescriptor> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return None;
        }

        // Tolerate one trailing delimiter, e.g. "...000032019322000050.txt|".
        let body = line.strip_suffix(self.config.delimiter).unwrap_or(line);
        let fields: Vec<&str> = body.split(self.config.delimiter).collect();
        if fields.len() != Self::FIELD_COUNT {
            tracing::warn!(
                "Index line has {} fields, expected {}: {:?}",
                fields.len(),
                Self::FIELD_COUNT,
                line
            );
            return None;
        }

        Some(FilingDescriptor {
            cik: fields[0].to_string(),
            company_name: fields[1].to_string(),
            form_type: fields[2].to_string(),
            date_filed: fields[3].to_string(),
            file_name: fields[4].to_string(),
            accession_number: normalize_accession(fields[4]),
        })
    }
}
