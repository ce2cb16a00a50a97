//! Statement file naming: `DD_MM_YYYY.txt` from the first movement date.

use std::sync::LazyLock;

use chrono::NaiveDate;
use conciliar_core::{Error, Result};
use regex::Regex;

use crate::parsers::StatementParser;

/// Lines mentioning the automatic investment product are dropped before upload.
const EXCLUDED_TERMS: [&str; 3] = ["Rende Facil", "Rende Fácil", "BB Rende"];

static FILE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})_(\d{2})_(\d{4})").expect("invalid file date regex"));

/// Upload name for a statement, derived from its first transaction date.
pub fn statement_file_name(parser: &StatementParser, text: &str) -> Result<String> {
    let date = parser
        .statement_date(text)
        .ok_or_else(|| Error::Parse("no transaction date found in statement".to_string()))?;
    Ok(format!("{}.txt", date.format("%d_%m_%Y")))
}

/// Date embedded in a file name as `DD_MM_YYYY`, if any.
pub fn file_name_date(name: &str) -> Option<NaiveDate> {
    FILE_DATE_RE.captures_iter(name).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

pub fn strip_excluded_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !EXCLUDED_TERMS.iter().any(|term| line.contains(term)))
        .collect::<Vec<_>>()
        .join("\n")
}
