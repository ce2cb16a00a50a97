//! Remote backend over HTTP: Supabase-style object storage for statements and
//! PostgREST tables for records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conciliar_core::{BlobEntry, BlobStore, Error, Filter, OrderBy, RecordStore, Result, Row};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

fn http_err(e: reqwest::Error) -> Error {
    Error::store(format!("http: {e}"))
}

fn auth_headers(key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| Error::store(format!("api key: {e}")))?;
    let apikey = HeaderValue::from_str(key).map_err(|e| Error::store(format!("api key: {e}")))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert("apikey", apikey);
    Ok(headers)
}

fn parse_base(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url).map_err(|e| Error::store(format!("remote url {base_url}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::store(format!("remote url {base_url} cannot take a path")));
    }
    Ok(url)
}

/// Base URL with `segments` appended, each percent-encoded as one path segment.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Non-2xx responses become store errors (404 becomes NotFound).
async fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND || body.contains("not_found") || body.contains("Object not found") {
        return Err(Error::NotFound(what.to_string()));
    }
    Err(Error::store(format!("{what}: {status}: {body}")))
}

pub struct RemoteBlobStore {
    client: Client,
    base: Url,
    bucket: String,
    headers: HeaderMap,
}

impl RemoteBlobStore {
    pub fn new(base_url: &str, key: &str, bucket: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base: parse_base(base_url)?,
            bucket: bucket.to_string(),
            headers: auth_headers(key)?,
        })
    }

    fn object_url(&self, name: &str) -> Url {
        endpoint(&self.base, &["storage", "v1", "object", self.bucket.as_str(), name])
    }
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    created_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl BlobStore for RemoteBlobStore {
    async fn list(&self) -> Result<Vec<BlobEntry>> {
        let url = endpoint(&self.base, &["storage", "v1", "object", "list", self.bucket.as_str()]);
        let body = json!({
            "prefix": "",
            "limit": 1000,
            "sortBy": { "column": "name", "order": "asc" }
        });
        let resp = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        let listed: Vec<ListedObject> = check(resp, "list").await?.json().await.map_err(http_err)?;
        Ok(listed
            .into_iter()
            .map(|o| BlobEntry { name: o.name, created_at: o.created_at.unwrap_or_else(Utc::now) })
            .collect())
    }

    async fn upload(&self, name: &str, data: Vec<u8>, upsert: bool) -> Result<()> {
        let resp = self
            .client
            .post(self.object_url(name))
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(data)
            .send()
            .await
            .map_err(http_err)?;
        check(resp, name).await?;
        debug!(name, upsert, "uploaded object");
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.object_url(name))
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(http_err)?;
        let bytes = check(resp, name).await?.bytes().await.map_err(http_err)?;
        Ok(bytes.to_vec())
    }

    async fn remove(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let url = endpoint(&self.base, &["storage", "v1", "object", self.bucket.as_str()]);
        let resp = self
            .client
            .delete(url)
            .headers(self.headers.clone())
            .json(&json!({ "prefixes": names }))
            .send()
            .await
            .map_err(http_err)?;
        check(resp, "remove").await?;
        Ok(())
    }
}

pub struct RemoteRecordStore {
    client: Client,
    base: Url,
    headers: HeaderMap,
}

impl RemoteRecordStore {
    pub fn new(base_url: &str, key: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base: parse_base(base_url)?,
            headers: auth_headers(key)?,
        })
    }

    fn table_url(&self, table: &str) -> Url {
        endpoint(&self.base, &["rest", "v1", table])
    }
}

/// PostgREST query string for a filtered, ordered select.
pub fn query_params(filters: &[Filter], order: Option<&OrderBy>) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for f in filters {
        let (column, value) = match f {
            Filter::Eq { column, value } => (column, format!("eq.{value}")),
            Filter::Prefix { column, value } => (column, format!("like.{}*", escape_like(value))),
            Filter::Contains { column, value } => (column, format!("ilike.*{}*", escape_like(value))),
        };
        params.push((column.clone(), value));
    }
    if let Some(order) = order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{dir}", order.column)));
    }
    params
}

fn escape_like(value: &str) -> String {
    value.replace('*', "\\*").replace('%', "\\%")
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&OrderBy>) -> Result<Vec<Row>> {
        let resp = self
            .client
            .get(self.table_url(table))
            .headers(self.headers.clone())
            .query(&query_params(filters, order))
            .send()
            .await
            .map_err(http_err)?;
        check(resp, table).await?.json().await.map_err(http_err)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let resp = self
            .client
            .post(self.table_url(table))
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(http_err)?;
        let mut rows: Vec<Row> = check(resp, table).await?.json().await.map_err(http_err)?;
        rows.pop()
            .ok_or_else(|| Error::store(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, row: Row, id: &str) -> Result<()> {
        let resp = self
            .client
            .patch(self.table_url(table))
            .headers(self.headers.clone())
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}"))])
            .json(&row)
            .send()
            .await
            .map_err(http_err)?;
        let updated: Vec<Value> = check(resp, table).await?.json().await.map_err(http_err)?;
        if updated.is_empty() {
            return Err(Error::NotFound(format!("{table}/{id}")));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.table_url(table))
            .headers(self.headers.clone())
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(http_err)?;
        check(resp, table).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let filters = vec![
            Filter::eq("tax_id_digits", "12345678901"),
            Filter::prefix("source_file", "Extratos"),
            Filter::contains("narration", "pix recebido"),
        ];
        let params = query_params(&filters, Some(&OrderBy::desc("created_at")));
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("tax_id_digits".to_string(), "eq.12345678901".to_string()),
                ("source_file".to_string(), "like.Extratos*".to_string()),
                ("narration".to_string(), "ilike.*pix recebido*".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_object_names_are_encoded() {
        let blobs = RemoteBlobStore::new("https://x.supabase.co", "k", "extratos").unwrap();
        assert_eq!(
            blobs.object_url("05_02_2024.txt").as_str(),
            "https://x.supabase.co/storage/v1/object/extratos/05_02_2024.txt"
        );
        assert_eq!(
            blobs.object_url("extrato março.txt").as_str(),
            "https://x.supabase.co/storage/v1/object/extratos/extrato%20mar%C3%A7o.txt"
        );
        assert_eq!(
            blobs.object_url("a/b.txt").as_str(),
            "https://x.supabase.co/storage/v1/object/extratos/a%2Fb.txt"
        );
    }

    #[test]
    fn test_urls() {
        let blobs = RemoteBlobStore::new("https://x.supabase.co/", "k", "extratos").unwrap();
        assert_eq!(
            blobs.object_url("Extratos.txt").as_str(),
            "https://x.supabase.co/storage/v1/object/extratos/Extratos.txt"
        );
        let records = RemoteRecordStore::new("https://x.supabase.co", "k").unwrap();
        assert_eq!(records.table_url("students").as_str(), "https://x.supabase.co/rest/v1/students");
        assert!(RemoteRecordStore::new("not a url", "k").is_err());
    }
}
