//! Learned identifications: one entry per human-confirmed match.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::counterparty::CounterpartyKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationHistoryEntry {
    /// Digits-only tax ID / document key; empty when the record had none
    #[serde(default)]
    pub tax_id_digits: String,
    #[serde(default)]
    pub narration: String,
    pub entity_kind: CounterpartyKind,
    pub entity_id: String,
    pub entity_name: String,
    /// Serialized as RFC 3339 with microseconds
    #[serde(default, with = "micros")]
    pub created_at: Option<DateTime<Utc>>,
}

mod micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(d)
    }
}

impl IdentificationHistoryEntry {
    pub fn new(
        tax_id_digits: impl Into<String>,
        narration: impl Into<String>,
        entity_kind: CounterpartyKind,
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Self {
        Self {
            tax_id_digits: tax_id_digits.into(),
            narration: narration.into(),
            entity_kind,
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            created_at: Some(Utc::now().trunc_subsecs(6)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_created_at_has_fixed_precision() {
        let mut entry = IdentificationHistoryEntry::new("4455", "Pix", CounterpartyKind::Associate, "a1", "Maria");
        entry.created_at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["created_at"], "2024-03-01T10:00:00.000000Z");

        let back: IdentificationHistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);

        let legacy = serde_json::json!({
            "entity_kind": "student",
            "entity_id": "s1",
            "entity_name": "Ana"
        });
        let old: IdentificationHistoryEntry = serde_json::from_value(legacy).unwrap();
        assert!(old.created_at.is_none());
        assert!(old.tax_id_digits.is_empty());
    }
}
