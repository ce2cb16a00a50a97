//! Known payers/payees. Maintained by the registry; read-only to the matcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::digits_only;
use crate::store::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyKind {
    Student,
    Associate,
    Other,
}

impl CounterpartyKind {
    /// Record-store table holding this variant.
    pub fn table(&self) -> &'static str {
        match self {
            CounterpartyKind::Student => tables::STUDENTS,
            CounterpartyKind::Associate => tables::ASSOCIATES,
            CounterpartyKind::Other => tables::OTHERS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyKind::Student => "student",
            CounterpartyKind::Associate => "associate",
            CounterpartyKind::Other => "other",
        }
    }
}

impl fmt::Display for CounterpartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterpartyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" | "aluno" => Ok(CounterpartyKind::Student),
            "associate" | "associado" => Ok(CounterpartyKind::Associate),
            "other" | "outro" => Ok(CounterpartyKind::Other),
            other => Err(Error::Validation(format!("unknown counterparty kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// CPF, formatted or not
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub class_group: Option<String>,
    #[serde(default)]
    pub started_on: Option<String>,
    #[serde(default)]
    pub born_on: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Associate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Suppliers, banks, donors: anything that is not a student or associate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherParty {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Required free-form category label ("fornecedor", "doador", ...)
    pub kind: String,
    /// CPF or CNPJ
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CounterpartyEntity {
    Student(Student),
    Associate(Associate),
    Other(OtherParty),
}

impl CounterpartyEntity {
    pub fn kind(&self) -> CounterpartyKind {
        match self {
            CounterpartyEntity::Student(_) => CounterpartyKind::Student,
            CounterpartyEntity::Associate(_) => CounterpartyKind::Associate,
            CounterpartyEntity::Other(_) => CounterpartyKind::Other,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CounterpartyEntity::Student(s) => &s.id,
            CounterpartyEntity::Associate(a) => &a.id,
            CounterpartyEntity::Other(o) => &o.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CounterpartyEntity::Student(s) => &s.name,
            CounterpartyEntity::Associate(a) => &a.name,
            CounterpartyEntity::Other(o) => &o.name,
        }
    }

    /// Digits-only tax ID. Associates carry none.
    pub fn tax_id_digits(&self) -> Option<String> {
        let raw = match self {
            CounterpartyEntity::Student(s) => s.tax_id.as_deref(),
            CounterpartyEntity::Associate(_) => None,
            CounterpartyEntity::Other(o) => o.tax_id.as_deref(),
        }?;
        let digits = digits_only(raw);
        (!digits.is_empty()).then_some(digits)
    }

    /// Reject entries missing required fields before they reach a store.
    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(Error::Validation(format!("{} name is required", self.kind())));
        }
        if let CounterpartyEntity::Other(o) = self {
            if o.kind.trim().is_empty() {
                return Err(Error::Validation("other: kind is required".to_string()));
            }
        }
        Ok(())
    }
}

/// Snapshot of all three registry variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entities: Vec<CounterpartyEntity>,
}

impl Registry {
    pub fn new(entities: Vec<CounterpartyEntity>) -> Self {
        Self { entities }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CounterpartyEntity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn of_kind(&self, kind: CounterpartyKind) -> impl Iterator<Item = &CounterpartyEntity> {
        self.entities.iter().filter(move |e| e.kind() == kind)
    }

    pub fn find(&self, kind: CounterpartyKind, id: &str) -> Option<&CounterpartyEntity> {
        self.of_kind(kind).find(|e| e.id() == id)
    }

    /// Exact digits-only tax ID match over students, then others.
    pub fn find_by_tax_id(&self, digits: &str) -> Option<&CounterpartyEntity> {
        if digits.is_empty() {
            return None;
        }
        [CounterpartyKind::Student, CounterpartyKind::Other]
            .into_iter()
            .find_map(|kind| {
                self.of_kind(kind)
                    .find(|e| e.tax_id_digits().as_deref() == Some(digits))
            })
    }
}
