//! Collaborator contracts: a named-blob store for raw statement files and a
//! row store for structured records and identification history.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Reserved blob holding the merged, deduplicated statement.
pub const MERGED_STATEMENT: &str = "Extratos.txt";
/// Reserved blob holding category metadata.
pub const METADATA_DOCUMENT: &str = "metadata.json";

pub mod tables {
    pub const STATEMENT_RECORDS: &str = "statement_records";
    pub const IDENTIFICATION_HISTORY: &str = "identification_history";
    pub const STUDENTS: &str = "students";
    pub const ASSOCIATES: &str = "associates";
    pub const OTHERS: &str = "others";
}

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list(&self) -> Result<Vec<BlobEntry>>;
    /// Fails when `name` exists and `upsert` is false.
    async fn upload(&self, name: &str, data: Vec<u8>, upsert: bool) -> Result<()>;
    /// [`Error::NotFound`] when missing.
    async fn download(&self, name: &str) -> Result<Vec<u8>>;
    async fn remove(&self, names: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: String, value: String },
    Prefix { column: String, value: String },
    /// Case-insensitive substring
    Contains { column: String, value: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq { column: column.into(), value: value.into() }
    }

    pub fn prefix(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Prefix { column: column.into(), value: value.into() }
    }

    pub fn contains(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains { column: column.into(), value: value.into() }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let (column, value) = match self {
            Filter::Eq { column, value }
            | Filter::Prefix { column, value }
            | Filter::Contains { column, value } => (column, value),
        };
        let Some(cell) = row.get(column).and_then(value_as_text) else {
            return false;
        };
        match self {
            Filter::Eq { .. } => cell == *value,
            Filter::Prefix { .. } => cell.starts_with(value.as_str()),
            Filter::Contains { .. } => cell.to_lowercase().contains(&value.to_lowercase()),
        }
    }
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&OrderBy>) -> Result<Vec<Row>>;
    /// Returns the stored row, with an `id` assigned when the input had none.
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;
    async fn update(&self, table: &str, row: Row, id: &str) -> Result<()>;
    async fn delete(&self, table: &str, id: &str) -> Result<()>;
}

/// Filter and order rows in memory; shared by the local store implementations.
pub fn query_rows<'a>(rows: impl Iterator<Item = &'a Row>, filters: &[Filter], order: Option<&OrderBy>) -> Vec<Row> {
    let mut out: Vec<Row> = rows
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .cloned()
        .collect();

    if let Some(order) = order {
        out.sort_by(|a, b| {
            let ord = compare_cells(a.get(&order.column), b.get(&order.column));
            if order.ascending { ord } else { ord.reverse() }
        });
    }
    out
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // timestamps written with different fractional widths
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => x.cmp(y),
            }
        }
        (Some(x), Some(y)) => value_as_text(x).cmp(&value_as_text(y)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::store(format!("expected an object row, got {other}"))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// `select` deserialized into `T`.
pub async fn select_as<T: DeserializeOwned>(
    store: &dyn RecordStore,
    table: &str,
    filters: &[Filter],
    order: Option<&OrderBy>,
) -> Result<Vec<T>> {
    store
        .select(table, filters, order)
        .await?
        .into_iter()
        .map(from_row)
        .collect()
}
