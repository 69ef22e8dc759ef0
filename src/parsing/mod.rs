//! Pure parsers for EDGAR artifacts: daily master indexes and ownership documents.

pub mod index;
pub mod ownership;
