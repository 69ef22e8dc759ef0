//! Field extraction for insider ownership documents (Forms 3, 4 and 5).
//!
//! A filing's composite `.txt` document embeds exactly one XML payload between literal
//! `<XML>` and `</XML>` markers. Payloads appear under different embedded filenames
//! (`form4.xml`, `primarydocument.xml`, ...), which is why the payload is located by
//! markers alone.
//!
//! Extraction is all-or-nothing: every entry of [`OWNERSHIP_FIELDS`] must resolve to a
//! node, otherwise the document yields `InsiderError::MissingField` for the first absent
//! one. Values are the node text exactly as written.

use crate::{InsiderError, Result};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

const XML_OPEN: &str = "<XML>";
const XML_CLOSE: &str = "</XML>";

/// One output row per filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExtractedFiling {
    pub issuer_cik: String,
    pub reporter_cik: String,
    pub accession_number: String,
    pub name_of_reporting_person: String,
    pub a_or_d: String,
    pub amount: String,
    pub price: String,
    pub transaction_date: String,
    pub title_of_security: String,
    pub issuer_name: String,
    pub issuer_ticker: String,
    pub is_director: String,
    pub is_officer: String,
    pub is_ten_percent_owner: String,
    pub is_other_relationship: String,
    pub new_amount_owned: String,
    pub direct_or_indirect_ownership: String,
}

impl ExtractedFiling {
    /// Column header, in field order.
    pub const COLUMNS: [&'static str; 17] = [
        "ISSUER_CIK",
        "REPORTER_CIK",
        "ACCESSION_NUMBER",
        "NAME_OF_REPORTING_PERSON",
        "A_OR_D",
        "AMOUNT",
        "PRICE",
        "TRANSACTION_DATE",
        "TITLE_OF_SECURITY",
        "ISSUER_NAME",
        "ISSUER_TICKER",
        "IS_DIRECTOR",
        "IS_OFFICER",
        "IS_TEN_PERCENT_OWNER",
        "IS_OTHER_RELATIONSHIP",
        "NEW_AMOUNT_OWNED",
        "DIRECT_OR_INDIRECT_OWNERSHIP",
    ];

    /// Field values in [`Self::COLUMNS`] order.
    pub fn record(&self) -> [&str; 17] {
        [
            &self.issuer_cik,
            &self.reporter_cik,
            &self.accession_number,
            &self.name_of_reporting_person,
            &self.a_or_d,
            &self.amount,
            &self.price,
            &self.transaction_date,
            &self.title_of_security,
            &self.issuer_name,
            &self.issuer_ticker,
            &self.is_director,
            &self.is_officer,
            &self.is_ten_percent_owner,
            &self.is_other_relationship,
            &self.new_amount_owned,
            &self.direct_or_indirect_ownership,
        ]
    }
}

/// Column name and absolute node path of every field read from the XML payload.
///
/// The order matches the destructuring in [`extract_fields`].
pub const OWNERSHIP_FIELDS: [(&str, &str); 16] = [
    ("ISSUER_CIK", "/ownershipDocument/issuer/issuerCik"),
    ("REPORTER_CIK", "/ownershipDocument/reportingOwner/reportingOwnerId/rptOwnerCik"),
    ("NAME_OF_REPORTING_PERSON", "/ownershipDocument/reportingOwner/reportingOwnerId/rptOwnerName"),
    ("A_OR_D", "/ownershipDocument/derivativeTable/derivativeTransaction/transactionAmounts/transactionAcquiredDisposedCode/value"),
    ("AMOUNT", "/ownershipDocument/derivativeTable/derivativeTransaction/transactionAmounts/transactionShares/value"),
    ("PRICE", "/ownershipDocument/derivativeTable/derivativeTransaction/transactionAmounts/transactionPricePerShare/value"),
    ("TRANSACTION_DATE", "/ownershipDocument/derivativeTable/derivativeTransaction/transactionDate/value"),
    ("TITLE_OF_SECURITY", "/ownershipDocument/derivativeTable/derivativeTransaction/securityTitle/value"),
    ("ISSUER_NAME", "/ownershipDocument/issuer/issuerName"),
    ("ISSUER_TICKER", "/ownershipDocument/issuer/issuerTradingSymbol"),
    ("IS_DIRECTOR", "/ownershipDocument/reportingOwner/reportingOwnerRelationship/isDirector"),
    ("IS_OFFICER", "/ownershipDocument/reportingOwner/reportingOwnerRelationship/isOfficer"),
    ("IS_TEN_PERCENT_OWNER", "/ownershipDocument/reportingOwner/reportingOwnerRelationship/isTenPercentOwner"),
    ("IS_OTHER_RELATIONSHIP", "/ownershipDocument/reportingOwner/reportingOwnerRelationship/isOther"),
    ("NEW_AMOUNT_OWNED", "/ownershipDocument/derivativeTable/derivativeTransaction/postTransactionAmounts/sharesOwnedFollowingTransaction/value"),
    ("DIRECT_OR_INDIRECT_OWNERSHIP", "/ownershipDocument/derivativeTable/derivativeTransaction/ownershipNature/directOrIndirectOwnership/value"),
];

/// Returns the text between the single `<XML>` / `</XML>` marker pair.
///
/// # Errors
///
/// `InsiderError::MalformedDocument` when either marker is missing or repeated.
pub fn xml_payload(document: &str) -> Result<&str> {
    let (_, rest) = split_once_exactly(document, XML_OPEN)
        .ok_or_else(|| InsiderError::MalformedDocument(format!("expected one {XML_OPEN} marker")))?;
    let (payload, _) = split_once_exactly(rest, XML_CLOSE)
        .ok_or_else(|| InsiderError::MalformedDocument(format!("expected one {XML_CLOSE} marker")))?;
    Ok(payload)
}

/// Splits on `marker` only when it occurs exactly once.
fn split_once_exactly<'a>(text: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let (before, after) = text.split_once(marker)?;
    if after.contains(marker) {
        return None;
    }
    Some((before, after))
}

/// Extracts a row from a composite filing document.
///
/// `accession_number` comes from the index entry; every other field is read from the
/// embedded XML.
///
/// # Errors
///
/// * `InsiderError::MalformedDocument` - marker problems or unparseable XML
/// * `InsiderError::MissingField` - the first field whose node is absent
pub fn extract_filing(document: &str, accession_number: &str) -> Result<ExtractedFiling> {
    let payload = xml_payload(document)?;
    extract_fields(payload.trim_start(), accession_number)
}

/// Extracts a row from a bare ownership XML payload.
pub fn extract_fields(xml: &str, accession_number: &str) -> Result<ExtractedFiling> {
    let doc = Document::parse(xml)
        .map_err(|e| InsiderError::MalformedDocument(format!("invalid XML: {}", e)))?;

    let mut values: [String; 16] = Default::default();
    for (slot, (column, path)) in values.iter_mut().zip(OWNERSHIP_FIELDS) {
        *slot = select_text(&doc, path).ok_or(InsiderError::MissingField(column))?;
    }

    let [
        issuer_cik,
        reporter_cik,
        name_of_reporting_person,
        a_or_d,
        amount,
        price,
        transaction_date,
        title_of_security,
        issuer_name,
        issuer_ticker,
        is_director,
        is_officer,
        is_ten_percent_owner,
        is_other_relationship,
        new_amount_owned,
        direct_or_indirect_ownership,
    ] = values;

    Ok(ExtractedFiling {
        issuer_cik,
        reporter_cik,
        accession_number: accession_number.to_string(),
        name_of_reporting_person,
        a_or_d,
        amount,
        price,
        transaction_date,
        title_of_security,
        issuer_name,
        issuer_ticker,
        is_director,
        is_officer,
        is_ten_percent_owner,
        is_other_relationship,
        new_amount_owned,
        direct_or_indirect_ownership,
    })
}

/// Resolves an absolute `/a/b/c` path and returns the text content of the first match
/// in document order.
///
/// The first segment may sit anywhere in the tree; the remaining segments are direct
/// children. Text content concatenates all descendant text nodes, untrimmed.
pub fn select_text(doc: &Document, path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == root)
        .find_map(|n| descend(n, &rest))
        .map(|n| {
            n.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect()
        })
}

fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    let Some((head, tail)) = path.split_first() else {
        return Some(node);
    };
    node.children()
        .filter(|c| c.is_element() && c.tag_name().name() == *head)
        .find_map(|c| descend(c, tail))
}
