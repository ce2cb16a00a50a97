//! Financial summary: credits and debits rolled up by category.

use std::collections::BTreeMap;
use std::io::Write;

use conciliar_core::{CategoryMetadata, Direction, Error, Result, TransactionRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub credits: Decimal,
    pub debits: Decimal,
    pub net: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinancialSummary {
    /// Sorted by category name
    pub rows: Vec<CategorySummary>,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub net: Decimal,
}

/// Group records by mapped category. Credits and debits are summed as
/// magnitudes, net as signed amounts; records whose amount does not parse are
/// left out.
pub fn summarize(records: &[TransactionRecord], metadata: &CategoryMetadata) -> FinancialSummary {
    let mut groups: BTreeMap<&str, CategorySummary> = BTreeMap::new();

    for record in records {
        let signed = match record.signed_amount() {
            Ok(v) => v,
            Err(e) => {
                warn!(narration = %record.narration, error = %e, "skipping record in summary");
                continue;
            }
        };
        let category = metadata.category_for(&record.narration);
        let row = groups.entry(category).or_insert_with(|| CategorySummary {
            category: category.to_string(),
            ..Default::default()
        });
        match record.direction {
            Direction::Credit => row.credits += signed,
            Direction::Debit => row.debits -= signed,
        }
        row.net += signed;
        row.count += 1;
    }

    let mut summary = FinancialSummary::default();
    for (_, row) in groups {
        summary.total_credits += row.credits;
        summary.total_debits += row.debits;
        summary.rows.push(row);
    }
    summary.net = summary.total_credits - summary.total_debits;
    summary
}

fn csv_amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// CSV export: one row per category plus a trailing `Total` row. Amounts use
/// two decimal places.
pub fn write_csv<W: Write>(summary: &FinancialSummary, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let csv_err = |e: csv::Error| Error::store(format!("csv: {e}"));

    wtr.write_record(["category", "credits", "debits", "net", "count"])
        .map_err(csv_err)?;
    for row in &summary.rows {
        wtr.write_record([
            row.category.clone(),
            csv_amount(row.credits),
            csv_amount(row.debits),
            csv_amount(row.net),
            row.count.to_string(),
        ])
        .map_err(csv_err)?;
    }
    let count: usize = summary.rows.iter().map(|r| r.count).sum();
    wtr.write_record([
        "Total".to_string(),
        csv_amount(summary.total_credits),
        csv_amount(summary.total_debits),
        csv_amount(summary.net),
        count.to_string(),
    ])
    .map_err(csv_err)?;
    wtr.flush().map_err(|e| Error::store(format!("csv: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conciliar_core::UNCATEGORIZED;

    fn record(narration: &str, amount: &str, direction: Direction) -> TransactionRecord {
        TransactionRecord {
            movement_date: "01/03/2024".to_string(),
            origin_branch: String::new(),
            lot: String::new(),
            narration: narration.to_string(),
            document_ref: String::new(),
            amount: amount.to_string(),
            direction,
            tax_id: None,
            tax_id_kind: None,
            counterparty_name_guess: None,
        }
    }

    fn metadata() -> CategoryMetadata {
        let mut meta = CategoryMetadata::default();
        meta.mappings.insert("Pix Recebido".to_string(), "Mensalidades".to_string());
        meta.mappings.insert("Aluguel".to_string(), "Aluguel".to_string());
        meta
    }

    #[test]
    fn test_groups_sorted_with_default_bucket() {
        let records = vec![
            record("Pix Recebido", "1.200,00", Direction::Credit),
            record(" Pix Recebido ", "300,00", Direction::Credit),
            record("Aluguel", "800,00", Direction::Debit),
            record("Tarifa", "-12,50", Direction::Debit),
            record("Estorno", "12,50", Direction::Credit),
        ];
        let s = summarize(&records, &metadata());

        let names: Vec<&str> = s.rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["Aluguel", "Mensalidades", UNCATEGORIZED]);

        let mens = &s.rows[1];
        assert_eq!(mens.credits, Decimal::new(150000, 2));
        assert_eq!(mens.count, 2);

        let other = &s.rows[2];
        assert_eq!(other.debits, Decimal::new(1250, 2));
        assert_eq!(other.net, Decimal::ZERO);

        assert_eq!(s.total_credits, Decimal::new(151250, 2));
        assert_eq!(s.total_debits, Decimal::new(81250, 2));
        assert_eq!(s.net, Decimal::new(70000, 2));
    }

    #[test]
    fn test_csv_amounts_have_two_decimals() {
        let records = vec![
            record("Pix Recebido", "7", Direction::Credit),
            record("Aluguel", "1.000,5", Direction::Debit),
        ];
        let mut out = Vec::new();
        write_csv(&summarize(&records, &metadata()), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Aluguel,0.00,1000.50,-1000.50,1");
        assert_eq!(lines[2], "Mensalidades,7.00,0.00,7.00,1");
    }

    #[test]
    fn test_unparseable_amounts_are_skipped() {
        let records = vec![record("Pix Recebido", "", Direction::Credit)];
        assert!(summarize(&records, &metadata()).rows.is_empty());
    }

    #[test]
    fn test_csv_export() {
        let records = vec![
            record("Pix Recebido", "100,00", Direction::Credit),
            record("Aluguel", "40,00", Direction::Debit),
        ];
        let mut out = Vec::new();
        write_csv(&summarize(&records, &metadata()), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "category,credits,debits,net,count");
        assert_eq!(lines[1], "Aluguel,0.00,40.00,-40.00,1");
        assert_eq!(lines[2], "Mensalidades,100.00,0.00,100.00,1");
        assert_eq!(lines[3], "Total,100.00,40.00,60.00,2");
    }
}
