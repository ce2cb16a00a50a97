//! Statement text parser for the bank's two textual layouts.
//!
//! Original export (two lines per movement):
//!   Dt. balancete  Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$
//!   01/03/2024  01/03/2024  0001  14397  9903  150,00 C
//!   12345678901 JOAO DA SILVA
//!
//! Merged file written by the merger (one line per movement):
//!   Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$
//!   01/03/2024  AG01  L1  12345678901 JOAO DA SILVA  DOC1  150,00 C

pub mod merged;
pub mod original;

use chrono::NaiveDate;
use conciliar_core::{Result, TransactionRecord};
use regex::Regex;
use tracing::debug;

use crate::identity::IdentityExtractor;
use crate::types::{IdentityHint, Layout, ParserOptions};

const HEADER_LABEL: &str = "Dt. movimento";
const BALANCE_DATE_LABEL: &str = "Dt. balancete";

/// Placeholder the merger writes for empty columns.
pub(crate) const EMPTY_FIELD: &str = "-";

/// Find the header line and decide the layout. `None` when there is no header.
pub fn detect_layout(text: &str) -> Option<(usize, Layout)> {
    text.lines().enumerate().find_map(|(i, line)| {
        if !line.contains(HEADER_LABEL) {
            return None;
        }
        let layout = if line.contains(BALANCE_DATE_LABEL) {
            Layout::Original
        } else {
            Layout::Merged
        };
        Some((i, layout))
    })
}

/// Marker that ends the statement body; later lines are scheduled entries.
pub(crate) fn is_terminator(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("lançamentos futuros") || lower.contains("lancamentos futuros")
}

pub(crate) fn is_separator(line: &str) -> bool {
    line.contains("===") || line.contains("---")
}

/// A movement whose narration is itself a balance line ("Saldo Anterior",
/// "S A L D O", "Saldo do dia"). Narrations merely mentioning a balance or a
/// total are real movements.
pub(crate) fn is_balance_marker(narration: &str) -> bool {
    let squashed: String = narration.to_lowercase().split_whitespace().collect();
    squashed.starts_with("saldo")
}

impl StatementParser {
    /// True for a line that starts a new movement.
    pub(crate) fn is_data_line(&self, line: &str) -> bool {
        let mut parts = self.field_split_re.split(line.trim());
        let starts_with_date = parts.next().is_some_and(|p| self.date_re.is_match(p));
        starts_with_date && parts.count() >= 3
    }
}

/// Compiled patterns plus options; build once, parse many statements.
pub struct StatementParser {
    options: ParserOptions,
    identity: IdentityExtractor,
    field_split_re: Regex,
    date_re: Regex,
    currency_re: Regex,
}

impl StatementParser {
    pub fn new(options: ParserOptions) -> Result<Self> {
        let compile = |p: &str| Regex::new(p).map_err(|e| conciliar_core::Error::Parse(e.to_string()));
        Ok(Self {
            options,
            identity: IdentityExtractor::new()?,
            field_split_re: compile(r"\s{2,}")?,
            date_re: compile(r"^\d{2}/\d{2}/\d{4}$")?,
            currency_re: compile(r"-?\d{1,3}(?:\.\d{3})*,\d{2}(?:\s*[DCdc])?")?,
        })
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Records in file order; empty when the text has no header line.
    pub fn parse(&self, text: &str) -> Vec<TransactionRecord> {
        let Some((header_idx, layout)) = detect_layout(text) else {
            debug!("no '{HEADER_LABEL}' header found; nothing to parse");
            return Vec::new();
        };

        let lines: Vec<&str> = text.lines().collect();
        let mut out = Vec::new();
        let mut i = header_idx + 1;

        while i < lines.len() {
            let line = lines[i].trim();
            let parts: Vec<&str> = self.field_split_re.split(line).collect();
            let is_movement = parts.len() >= 4 && self.date_re.is_match(parts[0]);

            // text between movements (totals, separators) is ignored
            if !is_movement {
                if is_terminator(line) {
                    break;
                }
                i += 1;
                continue;
            }

            let record = match layout {
                Layout::Merged => merged::parse_line(self, &parts),
                Layout::Original => {
                    let (narration, narration_idx) = original::narration_after(self, &lines, i + 1);
                    i = narration_idx;
                    original::parse_line(self, line, &parts, narration)
                }
            };
            if is_balance_marker(&record.narration) {
                debug!(narration = %record.narration, "skipping balance movement");
            } else {
                out.push(record);
            }
            i += 1;
        }

        debug!(layout = ?layout, records = out.len(), "parsed statement");
        out
    }

    pub fn identity_hint(&self, narration: &str) -> IdentityHint {
        self.identity.extract(narration)
    }

    /// Date of the first transaction, used to name uploaded statements.
    pub fn statement_date(&self, text: &str) -> Option<NaiveDate> {
        self.parse(text).iter().find_map(|r| r.movement_date())
    }
}

/// Convenience wrapper: compile a parser and run it once.
pub fn parse_statement_text(text: &str, options: &ParserOptions) -> Result<Vec<TransactionRecord>> {
    Ok(StatementParser::new(options.clone())?.parse(text))
}

pub(crate) fn field(parts: &[&str], idx: usize) -> String {
    let value = parts.get(idx).map(|s| s.trim()).unwrap_or("");
    if value == EMPTY_FIELD {
        String::new()
    } else {
        value.to_string()
    }
}

pub(crate) fn with_hint(mut record: TransactionRecord, hint: IdentityHint) -> TransactionRecord {
    record.tax_id = hint.tax_id;
    record.tax_id_kind = hint.tax_id_kind;
    record.counterparty_name_guess = hint.name;
    record
}
