//! Deduplicating merger: many overlapping statement exports in, one canonical
//! record set (and the consolidated `Extratos.txt`) out.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use conciliar_core::store::{from_row, tables, to_row};
use conciliar_core::{
    BlobStore, Error, Fingerprint, MERGED_STATEMENT, METADATA_DOCUMENT, RecordStore, Result, StoredRecord,
    TransactionRecord,
};
use conciliar_ingest::{StatementParser, file_name_date};
use futures_util::future::try_join_all;
use tracing::{debug, info};

/// A raw statement as stored in the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFile {
    pub name: String,
    pub text: String,
}

impl StatementFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub records: Vec<TransactionRecord>,
    /// Consolidated statement in the merged layout
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct Merger {
    parser: StatementParser,
}

impl Merger {
    pub fn new(parser: StatementParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &StatementParser {
        &self.parser
    }

    /// Oldest file first (undated names sort first), first occurrence of each
    /// fingerprint kept. Reserved blobs are ignored.
    pub fn merge(&self, files: &[StatementFile], generated_at: NaiveDateTime) -> MergeOutput {
        let mut ordered: Vec<&StatementFile> = files.iter().filter(|f| !is_reserved(&f.name)).collect();
        ordered.sort_by_key(|f| file_name_date(&f.name).unwrap_or(NaiveDate::MIN));

        let mut seen: HashSet<Fingerprint> = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates = 0usize;

        for file in ordered {
            let parsed = self.parser.parse(&file.text);
            debug!(file = %file.name, records = parsed.len(), "parsed statement file");
            for record in parsed {
                if seen.insert(record.fingerprint()) {
                    records.push(record);
                } else {
                    duplicates += 1;
                }
            }
        }

        info!(files = files.len(), records = records.len(), duplicates, "merged statements");
        let text = render_merged(&records, generated_at);
        MergeOutput { records, text }
    }

    /// Merge every statement in the blob store and upload `Extratos.txt`.
    pub async fn merge_store(&self, blobs: &dyn BlobStore, generated_at: NaiveDateTime) -> Result<MergeOutput> {
        let names: Vec<String> = blobs
            .list()
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| !is_reserved(name))
            .collect();

        let downloads = names.iter().map(|name| async move {
            let bytes = blobs.download(name).await?;
            Ok::<_, Error>(StatementFile::new(name.clone(), String::from_utf8_lossy(&bytes).into_owned()))
        });
        let files = try_join_all(downloads).await?;

        let output = self.merge(&files, generated_at);
        if output.records.is_empty() {
            return Err(Error::Parse("no transactions found in stored statements".to_string()));
        }

        blobs
            .upload(MERGED_STATEMENT, output.text.clone().into_bytes(), true)
            .await?;
        info!(name = MERGED_STATEMENT, records = output.records.len(), "uploaded merged statement");
        Ok(output)
    }
}

fn is_reserved(name: &str) -> bool {
    name == MERGED_STATEMENT || name == METADATA_DOCUMENT
}

const MERGED_HEADER: &str = "Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$";

/// Render records in the merged layout. Re-parsing the output yields the same
/// fingerprints.
pub fn render_merged(records: &[TransactionRecord], generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    out.push_str("Extrato Consolidado\n");
    out.push_str(&format!("Gerado em: {}\n\n", generated_at.format("%d/%m/%Y %H:%M:%S")));
    out.push_str(MERGED_HEADER);
    out.push_str("\n\n");

    for r in records {
        let line = [
            &r.movement_date,
            &r.origin_branch,
            &r.lot,
            &r.narration,
            &r.document_ref,
        ]
        .iter()
        .map(|f| column(f))
        .collect::<Vec<_>>()
        .join("  ");
        out.push_str(&format!("{line}  {} {}\n", column(&r.amount), r.direction.letter()));
    }
    out
}

/// Collapse internal whitespace so a value stays one column; `-` when empty.
fn column(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() { "-".to_string() } else { collapsed }
}

/// Insert records into `statement_records`, skipping fingerprints that are
/// already stored so earlier identifications survive a re-merge.
pub async fn publish_records(
    store: &dyn RecordStore,
    records: &[TransactionRecord],
    source_file: &str,
) -> Result<PublishReport> {
    let existing = store.select(tables::STATEMENT_RECORDS, &[], None).await?;
    let mut seen: HashSet<Fingerprint> = existing
        .into_iter()
        .map(from_row::<StoredRecord>)
        .map(|row| row.map(|stored| stored.record.fingerprint()))
        .collect::<Result<_>>()?;

    let mut report = PublishReport::default();
    for record in records {
        if !seen.insert(record.fingerprint()) {
            report.skipped += 1;
            continue;
        }
        let stored = StoredRecord {
            id: String::new(),
            source_file: source_file.to_string(),
            record: record.clone(),
            identification: None,
        };
        let mut row = to_row(&stored)?;
        row.remove("id");
        store.insert(tables::STATEMENT_RECORDS, row).await?;
        report.inserted += 1;
    }

    info!(inserted = report.inserted, skipped = report.skipped, "published statement records");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::Direction;
    use conciliar_ingest::ParserOptions;

    fn merger() -> Merger {
        Merger::new(StatementParser::new(ParserOptions::default()).unwrap())
    }

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap()
    }

    const MARCH: &str = "Dt. balancete  Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$\n\
                         01/03/2024  01/03/2024  0001  14397  9903  150,00 C\n\
                         12345678901 JOAO DA SILVA\n\
                         02/03/2024  02/03/2024  0001  13105  1  45,90 D\n\
                         Tarifa  Pacote   Servicos\n";

    #[test]
    fn test_render_layout() {
        let out = merger().merge(&[StatementFile::new("10_03_2024.txt", MARCH)], stamp());
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[0], "Extrato Consolidado");
        assert_eq!(lines[1], "Gerado em: 10/03/2024 09:30:00");
        assert_eq!(lines[3], MERGED_HEADER);
        assert_eq!(lines[5], "01/03/2024  0001  14397  12345678901 JOAO DA SILVA  9903  150,00 C");
        assert_eq!(lines[6], "02/03/2024  0001  13105  Tarifa Pacote Servicos  1  45,90 D");
    }

    #[test]
    fn test_merged_text_reparses_to_same_fingerprints() {
        let m = merger();
        let out = m.merge(&[StatementFile::new("10_03_2024.txt", MARCH)], stamp());
        let reparsed = m.parser().parse(&out.text);
        let a: Vec<_> = out.records.iter().map(TransactionRecord::fingerprint).collect();
        let b: Vec<_> = reparsed.iter().map(TransactionRecord::fingerprint).collect();
        assert_eq!(a, b);
        assert_eq!(reparsed[1].direction, Direction::Debit);
    }

    #[test]
    fn test_empty_fields_use_placeholder() {
        let record = TransactionRecord {
            movement_date: "05/03/2024".to_string(),
            origin_branch: String::new(),
            lot: String::new(),
            narration: "Deposito".to_string(),
            document_ref: String::new(),
            amount: "10,00".to_string(),
            direction: Direction::Credit,
            tax_id: None,
            tax_id_kind: None,
            counterparty_name_guess: None,
        };
        let text = render_merged(std::slice::from_ref(&record), stamp());
        assert!(text.contains("05/03/2024  -  -  Deposito  -  10,00 C"));

        let back = merger().parser().parse(&text);
        assert_eq!(back, vec![record]);
    }

    #[test]
    fn test_amountless_records_round_trip() {
        let base = TransactionRecord {
            movement_date: "06/03/2024".to_string(),
            origin_branch: "0001".to_string(),
            lot: "14397".to_string(),
            narration: "Estorno".to_string(),
            document_ref: "12".to_string(),
            amount: String::new(),
            direction: Direction::Credit,
            tax_id: None,
            tax_id_kind: None,
            counterparty_name_guess: None,
        };
        let debit = TransactionRecord {
            document_ref: "13".to_string(),
            direction: Direction::Debit,
            ..base.clone()
        };
        let records = vec![base, debit];
        let text = render_merged(&records, stamp());
        assert!(text.contains("06/03/2024  0001  14397  Estorno  12  - C"));

        let back = merger().parser().parse(&text);
        assert_eq!(back, records);
        let a: Vec<_> = records.iter().map(TransactionRecord::fingerprint).collect();
        let b: Vec<_> = back.iter().map(TransactionRecord::fingerprint).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_older_file_wins_and_reserved_names_ignored() {
        let newer = "Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$\n\
                     01/03/2024  AG99  L9  12345678901 JOÃO DA SILVA  9903  150,00 C\n";
        let files = vec![
            StatementFile::new("15_03_2024.txt", newer),
            StatementFile::new("10_03_2024.txt", MARCH),
            StatementFile::new(MERGED_STATEMENT, "Dt. movimento\n01/03/2024  a  b  c  d  1,00 C\n"),
        ];
        let out = merger().merge(&files, stamp());
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].origin_branch, "0001");
    }
}
