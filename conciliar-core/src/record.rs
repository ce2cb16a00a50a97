//! Transaction records produced by the statement parser.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::counterparty::CounterpartyKind;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::money::parse_br_amount;

/// Credit (money in) or debit (money out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "C")]
    Credit,
    #[serde(rename = "D")]
    Debit,
}

impl Direction {
    /// Single-letter marker used in statement files.
    pub fn letter(&self) -> char {
        match self {
            Direction::Credit => 'C',
            Direction::Debit => 'D',
        }
    }
}

/// Brazilian tax identifier flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxIdKind {
    /// Individual, 11 digits.
    Cpf,
    /// Company, 14 digits.
    Cnpj,
}

/// One statement movement, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// DD/MM/YYYY, as written in the statement
    pub movement_date: String,
    pub origin_branch: String,
    pub lot: String,
    pub narration: String,
    pub document_ref: String,
    /// Localized amount without the C/D marker (may keep a leading `-`)
    pub amount: String,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id_kind: Option<TaxIdKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name_guess: Option<String>,
}

impl TransactionRecord {
    /// Absolute value of the amount.
    pub fn amount_value(&self) -> Result<Decimal> {
        Ok(parse_br_amount(&self.amount)?.abs())
    }

    /// Amount signed by direction: credits positive, debits negative.
    pub fn signed_amount(&self) -> Result<Decimal> {
        let value = self.amount_value()?;
        Ok(match self.direction {
            Direction::Credit => value,
            Direction::Debit => -value,
        })
    }

    pub fn movement_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.movement_date.trim(), "%d/%m/%Y").ok()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// Keep only ASCII digits.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Who a stored record was attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub kind: CounterpartyKind,
    pub entity_id: String,
    pub entity_name: String,
}

/// A record as persisted in the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    /// Blob name the record was published from
    pub source_file: String,
    #[serde(flatten)]
    pub record: TransactionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

impl StoredRecord {
    pub fn is_identified(&self) -> bool {
        self.identification.is_some()
    }
}
