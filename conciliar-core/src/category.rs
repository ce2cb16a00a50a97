//! Narration → category label metadata, persisted as a single JSON document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Bucket for records whose narration has no mapping.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMetadata {
    /// Known labels, sorted and deduplicated
    #[serde(default)]
    pub options: BTreeSet<String>,
    /// Trimmed narration (verbatim) → label
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

impl CategoryMetadata {
    /// Mapped label for a narration, or [`UNCATEGORIZED`].
    pub fn category_for(&self, narration: &str) -> &str {
        self.mappings
            .get(narration.trim())
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
