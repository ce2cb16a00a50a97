//! Confirming identifications against the record store, and the bulk
//! auto-identify pass.

use std::sync::Arc;

use conciliar_core::store::{OrderBy, from_row, select_as, tables, to_row};
use conciliar_core::{
    Associate, CounterpartyEntity, CounterpartyKind, IdentificationHistoryEntry, Identification, OtherParty,
    RecordStore, Registry, Result, Row, StoredRecord, Student,
};
use futures_util::future::try_join3;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::matcher::{Confidence, NarrationMatcher, PrefixMatcher, Suggestion, lookup_keys, suggest_with};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoIdentifyReport {
    pub identified: usize,
    /// Unidentified rows left for manual review (Medium or no suggestion)
    pub skipped: usize,
    /// (row id, error) for rows whose confirmation failed
    pub failures: Vec<(String, String)>,
}

/// Matcher bound to a record store.
pub struct Identifier {
    store: Arc<dyn RecordStore>,
    narration_matcher: Box<dyn NarrationMatcher>,
}

impl Identifier {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_matcher(store, Box::new(PrefixMatcher::default()))
    }

    pub fn with_matcher(store: Arc<dyn RecordStore>, narration_matcher: Box<dyn NarrationMatcher>) -> Self {
        Self { store, narration_matcher }
    }

    /// All three registry tables, queried concurrently.
    pub async fn load_registry(&self) -> Result<Registry> {
        let store = self.store.as_ref();
        let (students, associates, others) = try_join3(
            select_as::<Student>(store, tables::STUDENTS, &[], None),
            select_as::<Associate>(store, tables::ASSOCIATES, &[], None),
            select_as::<OtherParty>(store, tables::OTHERS, &[], None),
        )
        .await?;

        let entities = students
            .into_iter()
            .map(CounterpartyEntity::Student)
            .chain(associates.into_iter().map(CounterpartyEntity::Associate))
            .chain(others.into_iter().map(CounterpartyEntity::Other))
            .collect();
        Ok(Registry::new(entities))
    }

    /// History oldest first.
    pub async fn load_history(&self) -> Result<Vec<IdentificationHistoryEntry>> {
        select_as(
            self.store.as_ref(),
            tables::IDENTIFICATION_HISTORY,
            &[],
            Some(&OrderBy::asc("created_at")),
        )
        .await
    }

    pub async fn load_records(&self) -> Result<Vec<StoredRecord>> {
        select_as(self.store.as_ref(), tables::STATEMENT_RECORDS, &[], None).await
    }

    pub fn suggest(
        &self,
        record: &StoredRecord,
        registry: &Registry,
        history: &[IdentificationHistoryEntry],
    ) -> Option<Suggestion> {
        suggest_with(&record.record, registry, history, self.narration_matcher.as_ref())
    }

    /// Validate and insert a registry entry; returns it with its assigned id.
    pub async fn register(&self, entity: CounterpartyEntity) -> Result<CounterpartyEntity> {
        entity.validate()?;
        let kind = entity.kind();
        let mut row = match &entity {
            CounterpartyEntity::Student(s) => to_row(s)?,
            CounterpartyEntity::Associate(a) => to_row(a)?,
            CounterpartyEntity::Other(o) => to_row(o)?,
        };
        if row.get("id").and_then(Value::as_str).is_some_and(str::is_empty) {
            row.remove("id");
        }
        let stored = self.store.insert(kind.table(), row).await?;
        let entity = match kind {
            CounterpartyKind::Student => CounterpartyEntity::Student(from_row(stored)?),
            CounterpartyKind::Associate => CounterpartyEntity::Associate(from_row(stored)?),
            CounterpartyKind::Other => CounterpartyEntity::Other(from_row(stored)?),
        };
        info!(kind = %kind, id = entity.id(), "registered counterparty");
        Ok(entity)
    }

    /// Attach an identity to a stored record and learn from it.
    ///
    /// The record row is updated first; a failed update leaves history
    /// untouched. One history entry is written per lookup key. If a history
    /// write fails, the entries already written are removed and the row's
    /// previous identification is restored before the error is returned.
    pub async fn identify(
        &self,
        record: &StoredRecord,
        kind: CounterpartyKind,
        entity_id: &str,
        entity_name: &str,
    ) -> Result<Vec<IdentificationHistoryEntry>> {
        let narration = record.record.narration.trim();
        let mut keys = lookup_keys(&record.record);
        if keys.is_empty() && !narration.is_empty() {
            keys.push(String::new());
        }
        let entries = keys
            .into_iter()
            .map(|key| {
                let entry = IdentificationHistoryEntry::new(key, narration, kind, entity_id, entity_name);
                to_row(&entry).map(|row| (entry, row))
            })
            .collect::<Result<Vec<_>>>()?;

        let identification = Identification {
            kind,
            entity_id: entity_id.to_string(),
            entity_name: entity_name.to_string(),
        };
        self.set_identification(&record.id, Some(&identification)).await?;

        if entries.is_empty() {
            debug!(id = %record.id, "identified without history: no key or narration");
            return Ok(Vec::new());
        }

        let mut learned = Vec::with_capacity(entries.len());
        let mut written = Vec::new();
        for (entry, row) in entries {
            match self.store.insert(tables::IDENTIFICATION_HISTORY, row).await {
                Ok(stored) => {
                    written.extend(stored.get("id").and_then(Value::as_str).map(str::to_string));
                    learned.push(entry);
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "history write failed; rolling back identification");
                    self.roll_back(record, &written).await;
                    return Err(e);
                }
            }
        }
        info!(id = %record.id, kind = %kind, entity = entity_id, keys = learned.len(), "identified record");
        Ok(learned)
    }

    async fn set_identification(&self, id: &str, identification: Option<&Identification>) -> Result<()> {
        let mut patch = Row::new();
        patch.insert("identification".to_string(), serde_json::to_value(identification)?);
        self.store.update(tables::STATEMENT_RECORDS, patch, id).await
    }

    async fn roll_back(&self, record: &StoredRecord, history_ids: &[String]) {
        for history_id in history_ids {
            if let Err(e) = self.store.delete(tables::IDENTIFICATION_HISTORY, history_id).await {
                warn!(id = %history_id, error = %e, "could not remove history entry");
            }
        }
        if let Err(e) = self.set_identification(&record.id, record.identification.as_ref()).await {
            warn!(id = %record.id, error = %e, "could not restore record identification");
        }
    }

    /// Confirm every High suggestion among unidentified records, one at a time.
    pub async fn auto_identify_all(&self) -> Result<AutoIdentifyReport> {
        let (registry, mut history, records) =
            try_join3(self.load_registry(), self.load_history(), self.load_records()).await?;

        let mut report = AutoIdentifyReport::default();
        for record in records.iter().filter(|r| !r.is_identified()) {
            let suggestion = match self.suggest(record, &registry, &history) {
                Some(s) if s.confidence == Confidence::High => s,
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };

            match self
                .identify(record, suggestion.kind, &suggestion.entity_id, &suggestion.entity_name)
                .await
            {
                Ok(learned) => {
                    history.extend(learned);
                    report.identified += 1;
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "auto-identify failed for record");
                    report.failures.push((record.id.clone(), e.to_string()));
                }
            }
        }

        info!(
            identified = report.identified,
            skipped = report.skipped,
            failed = report.failures.len(),
            "auto-identify finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::{Direction, Error, MemoryRecordStore, TaxIdKind, TransactionRecord};

    fn record(narration: &str, doc: &str) -> TransactionRecord {
        TransactionRecord {
            movement_date: "01/03/2024".to_string(),
            origin_branch: "0001".to_string(),
            lot: "1".to_string(),
            narration: narration.to_string(),
            document_ref: doc.to_string(),
            amount: "10,00".to_string(),
            direction: Direction::Credit,
            tax_id: None,
            tax_id_kind: None,
            counterparty_name_guess: None,
        }
    }

    fn record_with_tax_id(narration: &str, doc: &str, tax_id: &str) -> TransactionRecord {
        TransactionRecord {
            tax_id: Some(tax_id.to_string()),
            tax_id_kind: Some(TaxIdKind::Cpf),
            ..record(narration, doc)
        }
    }

    async fn seed(store: &MemoryRecordStore, record: TransactionRecord) -> StoredRecord {
        let stored = StoredRecord {
            id: String::new(),
            source_file: "Extratos.txt".to_string(),
            record,
            identification: None,
        };
        let mut row = to_row(&stored).unwrap();
        row.remove("id");
        from_row(store.insert(tables::STATEMENT_RECORDS, row).await.unwrap()).unwrap()
    }

    async fn student(identifier: &Identifier, name: &str, cpf: &str) -> CounterpartyEntity {
        identifier
            .register(CounterpartyEntity::Student(Student {
                name: name.to_string(),
                tax_id: Some(cpf.to_string()),
                ..Default::default()
            }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identify_then_suggestion_is_high() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let first = seed(&mem, record("Pix recebido", "4455")).await;
        let second = seed(&mem, record("Pix outro texto", "4455")).await;

        let registry = identifier.load_registry().await.unwrap();
        assert!(identifier.suggest(&second, &registry, &[]).is_none());

        let learned = identifier
            .identify(&first, CounterpartyKind::Associate, "a1", "Maria Souza")
            .await
            .unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].tax_id_digits, "4455");

        let records = identifier.load_records().await.unwrap();
        let updated = records.iter().find(|r| r.id == first.id).unwrap();
        assert_eq!(updated.identification.as_ref().map(|i| i.entity_id.as_str()), Some("a1"));

        let history = identifier.load_history().await.unwrap();
        let s = identifier.suggest(&second, &registry, &history).unwrap();
        assert_eq!(s.confidence, Confidence::High);
        assert_eq!(s.entity_id, "a1");
    }

    #[tokio::test]
    async fn test_identify_learns_document_and_tax_id() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let confirmed = seed(&mem, record_with_tax_id("Pix 123.456.789-01 ANA", "4455", "123.456.789-01")).await;
        let same_doc = seed(&mem, record("Boleto", "4455")).await;
        let same_tax = seed(&mem, record_with_tax_id("Pix", "9001", "12345678901")).await;

        let learned = identifier
            .identify(&confirmed, CounterpartyKind::Student, "s7", "Ana")
            .await
            .unwrap();
        let keys: Vec<&str> = learned.iter().map(|e| e.tax_id_digits.as_str()).collect();
        assert_eq!(keys, vec!["12345678901", "4455"]);
        assert_eq!(mem.count(tables::IDENTIFICATION_HISTORY), 2);

        let registry = identifier.load_registry().await.unwrap();
        let history = identifier.load_history().await.unwrap();
        for other in [&same_doc, &same_tax] {
            let s = identifier.suggest(other, &registry, &history).unwrap();
            assert_eq!((s.confidence, s.entity_id.as_str()), (Confidence::High, "s7"));
        }
    }

    #[tokio::test]
    async fn test_failed_history_write_restores_record() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let r = seed(&mem, record("Pix", "4455")).await;

        mem.fail_table(tables::IDENTIFICATION_HISTORY, true);
        let err = identifier
            .identify(&r, CounterpartyKind::Associate, "a1", "Maria")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let records = identifier.load_records().await.unwrap();
        assert!(!records[0].is_identified());
        assert_eq!(mem.count(tables::IDENTIFICATION_HISTORY), 0);
    }

    #[tokio::test]
    async fn test_failed_update_skips_history() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let r = seed(&mem, record("Pix", "1")).await;

        mem.fail_table(tables::STATEMENT_RECORDS, true);
        let err = identifier
            .identify(&r, CounterpartyKind::Associate, "a1", "Maria")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(mem.count(tables::IDENTIFICATION_HISTORY), 0);
    }

    #[tokio::test]
    async fn test_blank_record_identifies_without_history() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let r = seed(&mem, record("  ", "")).await;
        let learned = identifier
            .identify(&r, CounterpartyKind::Other, "o1", "Banco")
            .await
            .unwrap();
        assert!(learned.is_empty());
        assert!(identifier.load_records().await.unwrap()[0].is_identified());
        assert_eq!(mem.count(tables::IDENTIFICATION_HISTORY), 0);
    }

    #[tokio::test]
    async fn test_register_validates_before_insert() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        let err = identifier
            .register(CounterpartyEntity::Other(OtherParty {
                name: "Papelaria".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(mem.count(tables::OTHERS), 0);

        let joao = student(&identifier, "Joao", "123.456.789-01").await;
        assert!(!joao.id().is_empty());
        assert_eq!(identifier.load_registry().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_identify_confirms_only_high() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        student(&identifier, "Joao da Silva", "123.456.789-01").await;
        mem.insert(
            tables::IDENTIFICATION_HISTORY,
            to_row(&IdentificationHistoryEntry::new(
                "",
                "pix recebido maria souza",
                CounterpartyKind::Associate,
                "a1",
                "Maria Souza",
            ))
            .unwrap(),
        )
        .await
        .unwrap();

        let high = seed(&mem, record("Pix", "12345678901")).await;
        let medium = seed(&mem, record("Pix Recebido Maria Souza", "")).await;
        let none = seed(&mem, record("Tarifa pacote", "")).await;

        let report = identifier.auto_identify_all().await.unwrap();
        assert_eq!(report.identified, 1);
        assert_eq!(report.skipped, 2);
        assert!(report.failures.is_empty());

        let records = identifier.load_records().await.unwrap();
        let by_id = |id: &str| records.iter().find(|r| r.id == id).cloned().unwrap();
        assert!(by_id(&high.id).is_identified());
        assert!(!by_id(&medium.id).is_identified());
        assert!(!by_id(&none.id).is_identified());
        assert_eq!(mem.count(tables::IDENTIFICATION_HISTORY), 2);
    }

    #[tokio::test]
    async fn test_auto_identify_collects_failures() {
        let mem = Arc::new(MemoryRecordStore::new());
        let identifier = Identifier::new(mem.clone());
        student(&identifier, "Joao da Silva", "12345678901").await;
        seed(&mem, record("Pix", "12345678901")).await;
        seed(&mem, record("Pix de novo", "12345678901")).await;

        mem.fail_table(tables::IDENTIFICATION_HISTORY, true);
        let report = identifier.auto_identify_all().await.unwrap();
        assert_eq!(report.identified, 0);
        assert_eq!(report.failures.len(), 2);
        let records = identifier.load_records().await.unwrap();
        assert!(records.iter().all(|r| !r.is_identified()));

        // the rows stay eligible once history is writable again
        mem.fail_table(tables::IDENTIFICATION_HISTORY, false);
        let retry = identifier.auto_identify_all().await.unwrap();
        assert_eq!(retry.identified, 2);
        assert!(retry.failures.is_empty());
    }
}
