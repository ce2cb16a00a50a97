//! Local backend: statements as files in a directory, tables as JSON arrays.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conciliar_core::store::query_rows;
use conciliar_core::{BlobEntry, BlobStore, Error, Filter, OrderBy, RecordStore, Result, Row};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

fn io_err(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::store(format!("{}: {e}", path.display()))
    }
}

/// Blob names are plain file names; anything path-like is rejected.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::Validation(format!("invalid file name: {name:?}")));
    }
    Ok(())
}

pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(&self) -> Result<Vec<BlobEntry>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| io_err(&self.dir, e))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&self.dir, e))? {
            let meta = entry.metadata().await.map_err(|e| io_err(&entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            let created_at: DateTime<Utc> = meta
                .created()
                .or_else(|_| meta.modified())
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(BlobEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                created_at,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn upload(&self, name: &str, data: Vec<u8>, upsert: bool) -> Result<()> {
        check_name(name)?;
        let path = self.dir.join(name);
        if !upsert && fs::try_exists(&path).await.map_err(|e| io_err(&path, e))? {
            return Err(Error::store(format!("{name} already exists")));
        }
        fs::write(&path, data).await.map_err(|e| io_err(&path, e))
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        check_name(name)?;
        let path = self.dir.join(name);
        fs::read(&path).await.map_err(|e| io_err(&path, e))
    }

    async fn remove(&self, names: &[String]) -> Result<()> {
        for name in names {
            check_name(name)?;
            let path = self.dir.join(name);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        Ok(())
    }
}

/// One `<table>.json` file per table. Writes go through a single lock so
/// read-modify-write cycles from this process do not interleave.
pub struct JsonRecordStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonRecordStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        Ok(Self { dir, lock: Mutex::new(()) })
    }

    fn table_path(&self, table: &str) -> Result<PathBuf> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Validation(format!("invalid table name: {table:?}")));
        }
        Ok(self.dir.join(format!("{table}.json")))
    }

    async fn read_table(&self, table: &str) -> Result<Vec<Row>> {
        let path = self.table_path(table)?;
        match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn write_table(&self, table: &str, rows: &[Row]) -> Result<()> {
        let path = self.table_path(table)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(rows)?;
        fs::write(&tmp, bytes).await.map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_err(&path, e))
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `<table>-<n>` with n one past the highest numeric suffix in use.
fn next_id(table: &str, rows: &[Row]) -> String {
    let max = rows
        .iter()
        .filter_map(row_id)
        .filter_map(|id| id.rsplit('-').next())
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{table}-{}", max + 1)
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&OrderBy>) -> Result<Vec<Row>> {
        let rows = self.read_table(table).await?;
        Ok(query_rows(rows.iter(), filters, order))
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_table(table).await?;
        if row_id(&row).is_none() {
            row.insert("id".to_string(), Value::String(next_id(table, &rows)));
        }
        rows.push(row.clone());
        self.write_table(table, &rows).await?;
        Ok(row)
    }

    async fn update(&self, table: &str, row: Row, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_table(table).await?;
        let existing = rows
            .iter_mut()
            .find(|r| row_id(r) == Some(id))
            .ok_or_else(|| Error::NotFound(format!("{table}/{id}")))?;
        for (k, v) in row {
            if k != "id" {
                existing.insert(k, v);
            }
        }
        self.write_table(table, &rows).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_table(table).await?;
        let before = rows.len();
        rows.retain(|r| row_id(r) != Some(id));
        if rows.len() != before {
            self.write_table(table, &rows).await?;
        }
        Ok(())
    }
}
