use crate::parsing::index::FilingDescriptor;

/// Options for narrowing a period's filings before extraction.
///
/// Form types match exactly and case-sensitively: `"4"` does not select `"4/A"` unless
/// both are listed.
#[derive(Debug, Clone, Default)]
pub struct FilingOptions {
    pub form_types: Option<Vec<String>>,
    /// CIKs as written in the index, leading zeros included.
    pub ciks: Option<Vec<String>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl FilingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form 4 and its amendment, the production selection.
    pub fn insider_forms() -> Self {
        Self::new().with_form_types(vec!["4".to_string(), "4/A".to_string()])
    }

    pub fn with_form_type(mut self, form_type: impl Into<String>) -> Self {
        self.form_types = Some(vec![form_type.into()]);
        self
    }

    pub fn with_form_types(mut self, form_types: Vec<String>) -> Self {
        self.form_types = Some(form_types);
        self
    }

    pub fn with_cik(mut self, cik: impl Into<String>) -> Self {
        self.ciks = Some(vec![cik.into()]);
        self
    }

    pub fn with_ciks(mut self, ciks: Vec<String>) -> Self {
        self.ciks = Some(ciks);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if the descriptor passes the form type and CIK filters.
    pub fn matches(&self, filing: &FilingDescriptor) -> bool {
        let form_ok = self
            .form_types
            .as_ref()
            .is_none_or(|types| types.iter().any(|ft| *ft == filing.form_type));
        let cik_ok = self
            .ciks
            .as_ref()
            .is_none_or(|ciks| ciks.iter().any(|cik| *cik == filing.cik));
        form_ok && cik_ok
    }

    /// Applies the filters, then offset and limit, preserving order.
    pub fn apply(&self, filings: Vec<FilingDescriptor>) -> Vec<FilingDescriptor> {
        filter_filings(filings, |f| self.matches(f))
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Order-preserving subsequence of `filings` accepted by `predicate`.
pub fn filter_filings<P>(mut filings: Vec<FilingDescriptor>, mut predicate: P) -> Vec<FilingDescriptor>
where
    P: FnMut(&FilingDescriptor) -> bool,
{
    filings.retain(|f| predicate(f));
    filings
}
