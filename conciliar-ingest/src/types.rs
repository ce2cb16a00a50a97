use conciliar_core::TaxIdKind;
use serde::{Deserialize, Serialize};

/// Line layout of a statement export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// One line per transaction (the consolidated file we write ourselves)
    Merged,
    /// Bank export: data line followed by a narration line
    Original,
}

/// Which currency-looking token on an original-layout data line is the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmountColumn {
    /// Final match on the line
    #[default]
    Last,
    /// n-th match counting from the end (1 = last). Use 2 when the line ends
    /// with a running-balance column.
    FromEnd(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserOptions {
    #[serde(default)]
    pub amount_column: AmountColumn,
}

/// Identity signals pulled out of a narration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHint {
    pub tax_id: Option<String>,
    pub tax_id_kind: Option<TaxIdKind>,
    pub name: Option<String>,
}

impl IdentityHint {
    pub fn is_empty(&self) -> bool {
        self.tax_id.is_none() && self.name.is_none()
    }
}
