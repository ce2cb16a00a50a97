//! Canonical fingerprint used to deduplicate records across overlapping exports.

use std::fmt;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::record::TransactionRecord;

/// Decompose, drop diacritics, collapse whitespace, lowercase, trim.
pub fn normalize_field(value: &str) -> String {
    let stripped: String = value.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Composite key over date, narration, document and amount. Origin branch and
/// lot are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(record: &TransactionRecord) -> Self {
        let key = [
            record.movement_date.as_str(),
            record.narration.as_str(),
            record.document_ref.as_str(),
            record.amount.as_str(),
        ]
        .iter()
        .map(|f| normalize_field(f))
        .collect::<Vec<_>>()
        .join("|");
        Fingerprint(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
