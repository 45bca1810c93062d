//! Search index bulk-load contract.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::record::ImageRecord;

/// Writes an action header plus document line for every record.
pub fn write_bulk<'a, W, I>(writer: &mut W, index: &str, records: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a ImageRecord>,
{
    let mut written = 0usize;
    for record in records {
        let action = json!({ "index": { "_index": index, "_id": record.checksum() } });
        serde_json::to_writer(&mut *writer, &action)?;
        writer.write_all(b"\n")?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    Ok(written)
}

/// Index settings and mappings for GIF documents.
///
/// `uses` and `vecs` are nested so per-use and per-vector queries match
/// within one element; `vecs.vector` is a `dense_vector` of `dims` components.
pub fn index_mapping(dims: usize) -> Value {
    let keyword = json!({ "type": "keyword" });
    let text = json!({ "type": "text" });
    json!({
        "mappings": {
            "properties": {
                "checksum": keyword,
                "terms": text,
                "uses": {
                    "type": "nested",
                    "properties": {
                        "url": keyword,
                        "timestamp": keyword,
                        "page": {
                            "properties": {
                                "url": keyword,
                                "timestamp": keyword
                            }
                        },
                        "alt": text,
                        "path": text,
                        "filename": text
                    }
                },
                "page_count": { "type": "integer" },
                "width": { "type": "integer" },
                "height": { "type": "integer" },
                "vecs": {
                    "type": "nested",
                    "properties": {
                        "vector": {
                            "type": "dense_vector",
                            "dims": dims,
                            "index": true,
                            "similarity": "cosine"
                        }
                    }
                },
                "mnsfw": { "type": "float" },
                "knsfw": { "type": "boolean" },
                "mspec": keyword
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Thin HTTP client for one search index.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: Client,
    base: Url,
    index: String,
}

impl SearchClient {
    /// Builds a client for `index` on the cluster at `base`.
    pub fn new(base: &str, index: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid search URL '{base}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base,
            index: index.into(),
        })
    }

    /// Fails unless the cluster answers.
    pub async fn ping(&self) -> Result<()> {
        self.http
            .get(self.base.clone())
            .send()
            .await
            .with_context(|| format!("search index at {} is unreachable", self.base))?
            .error_for_status()
            .context("search index health check failed")?;
        Ok(())
    }

    /// Creates the index with [`index_mapping`] unless it already exists.
    ///
    /// Returns true when the index was created.
    pub async fn ensure_index(&self, dims: usize) -> Result<bool> {
        let url = self.endpoint(&self.index)?;
        let status = self
            .http
            .head(url.clone())
            .send()
            .await
            .context("failed to check index")?
            .status();
        if status.is_success() {
            return Ok(false);
        }
        anyhow::ensure!(
            status == StatusCode::NOT_FOUND,
            "unexpected status {status} checking index {}",
            self.index
        );
        self.http
            .put(url)
            .json(&index_mapping(dims))
            .send()
            .await
            .context("failed to create index")?
            .error_for_status()
            .with_context(|| format!("index {} creation rejected", self.index))?;
        Ok(true)
    }

    /// Posts one NDJSON bulk body, failing if any item was rejected.
    pub async fn bulk(&self, body: Vec<u8>) -> Result<usize> {
        let url = self.endpoint("_bulk")?;
        let response: BulkResponse = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("bulk request failed")?
            .error_for_status()
            .context("bulk request rejected")?
            .json()
            .await
            .context("invalid bulk response")?;
        anyhow::ensure!(
            !response.errors,
            "bulk load reported item errors: {}",
            first_item_error(&response.items).unwrap_or_else(|| "unknown".to_string())
        );
        Ok(response.items.len())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }
}

fn first_item_error(items: &[Value]) -> Option<String> {
    items
        .iter()
        .filter_map(|item| item.get("index"))
        .find_map(|action| action.get("error"))
        .map(Value::to_string)
}
