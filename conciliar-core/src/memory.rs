//! In-memory store implementations for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{BlobEntry, BlobStore, Filter, OrderBy, RecordStore, Row, query_rows};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    files: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload/remove fail with a store error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Vec<u8>, DateTime<Utc>)>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("blob store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self) -> Result<Vec<BlobEntry>> {
        Ok(self
            .lock()
            .iter()
            .map(|(name, (_, created_at))| BlobEntry { name: name.clone(), created_at: *created_at })
            .collect())
    }

    async fn upload(&self, name: &str, data: Vec<u8>, upsert: bool) -> Result<()> {
        self.check_writable()?;
        let mut files = self.lock();
        if !upsert && files.contains_key(name) {
            return Err(Error::store(format!("{name} already exists")));
        }
        files.insert(name.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        self.lock()
            .get(name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn remove(&self, names: &[String]) -> Result<()> {
        self.check_writable()?;
        let mut files = self.lock();
        for name in names {
            files.remove(name);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    next_id: AtomicU64,
    failing: Mutex<HashSet<String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes to `table` fail (reads keep working).
    pub fn fail_table(&self, table: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap_or_else(|p| p.into_inner());
        if fail {
            failing.insert(table.to_string());
        } else {
            failing.remove(table);
        }
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().get(table).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Row>>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, table: &str) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(|p| p.into_inner());
        if failing.contains(table) {
            return Err(Error::store(format!("table {table} unavailable")));
        }
        Ok(())
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&OrderBy>) -> Result<Vec<Row>> {
        let tables = self.lock();
        Ok(tables
            .get(table)
            .map(|rows| query_rows(rows.iter(), filters, order))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        self.check_writable(table)?;
        if row_id(&row).is_none() {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            row.insert("id".to_string(), Value::String(format!("{table}-{n}")));
        }
        self.lock().entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, row: Row, id: &str) -> Result<()> {
        self.check_writable(table)?;
        let mut tables = self.lock();
        let existing = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
            .ok_or_else(|| Error::NotFound(format!("{table}/{id}")))?;
        for (k, v) in row {
            if k != "id" {
                existing.insert(k, v);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        self.check_writable(table)?;
        if let Some(rows) = self.lock().get_mut(table) {
            rows.retain(|r| row_id(r) != Some(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_blob_upsert_and_not_found() {
        let store = MemoryBlobStore::new();
        store.upload("a.txt", b"one".to_vec(), false).await.unwrap();
        assert!(store.upload("a.txt", b"two".to_vec(), false).await.is_err());
        store.upload("a.txt", b"two".to_vec(), true).await.unwrap();
        assert_eq!(store.download("a.txt").await.unwrap(), b"two");
        assert!(store.download("b.txt").await.unwrap_err().is_not_found());

        store.remove(&["a.txt".to_string()]).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_insert_update_delete() {
        let store = MemoryRecordStore::new();
        let row = json!({"name": "Maria"}).as_object().cloned().unwrap();
        let stored = store.insert("associates", row).await.unwrap();
        let id = stored["id"].as_str().unwrap().to_string();

        let patch = json!({"status": "ativo"}).as_object().cloned().unwrap();
        store.update("associates", patch, &id).await.unwrap();
        let rows = store.select("associates", &[Filter::eq("id", &id)], None).await.unwrap();
        assert_eq!(rows[0]["status"], "ativo");
        assert_eq!(rows[0]["name"], "Maria");

        store.delete("associates", &id).await.unwrap();
        assert_eq!(store.count("associates"), 0);
    }

    #[tokio::test]
    async fn test_failing_table_rejects_writes() {
        let store = MemoryRecordStore::new();
        store.fail_table("t", true);
        let row = json!({"x": 1}).as_object().cloned().unwrap();
        assert!(matches!(store.insert("t", row).await, Err(Error::Store(_))));
        assert!(store.select("t", &[], None).await.unwrap().is_empty());
    }
}
