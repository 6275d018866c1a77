//! CFDI normalizer.
//!
//! Turns raw CFDI documents (3.2, 3.3 and 4.0) into [`InvoiceRecord`]s.
//! A document without a valid stamp UUID never becomes a record.

mod codes;
mod normalize;

pub use codes::{bare_code, cfdi_usage_info, tax_code, UsageInfo};
pub use normalize::{parse, CFDI_NS_3, CFDI_NS_4};

use crate::taxonomy::MappedError;
use crate::types::InvoiceRecord;

/// Records extracted from a set of documents, with the shortfall counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDocuments {
    pub records: Vec<InvoiceRecord>,

    /// Well-formed documents without a stamp UUID.
    pub unstamped: usize,

    /// Documents that could not be parsed.
    pub malformed: usize,
}

impl NormalizedDocuments {
    /// Documents that did not produce a record.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.unstamped + self.malformed
    }
}

/// Normalize every document of a package.
///
/// A malformed document is logged and counted; it never aborts the rest.
pub fn normalize_package<I, D>(documents: I) -> NormalizedDocuments
where
    I: IntoIterator<Item = D>,
    D: AsRef<[u8]>,
{
    let mut result = NormalizedDocuments::default();

    for (index, document) in documents.into_iter().enumerate() {
        match parse(document.as_ref()) {
            Ok(Some(record)) => result.records.push(record),
            Ok(None) => result.unstamped += 1,
            Err(e) => {
                let mapped = MappedError::from(&e);
                tracing::warn!(
                    index,
                    code = %mapped.code,
                    category = %mapped.category,
                    error = %e,
                    "skipping malformed document"
                );
                result.malformed += 1;
            }
        }
    }

    result
}
