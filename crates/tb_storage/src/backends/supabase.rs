use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tb_core::{Article, ArticleStatus, ArticleStorage, Error, Result, UpsertOutcome};
use tracing::{debug, info, warn};

use crate::{article_to_row, filter_columns, merge_row, row_to_article, Row};

pub const DEFAULT_TABLE: &str = "articles";

/// Links per `in.(...)` lookup, keeps request URLs short.
const LOOKUP_CHUNK: usize = 50;

/// Article table behind a Supabase (PostgREST) endpoint.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    columns: HashSet<String>,
}

impl fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl SupabaseStorage {
    /// Connects and discovers the table's declared columns. Discovery failure
    /// disables column filtering instead of failing.
    pub async fn connect(url: &str, api_key: &str, table: &str) -> Result<Self> {
        url::Url::parse(url).map_err(|e| Error::Config(format!("invalid SUPABASE_URL {}: {}", url, e)))?;
        if api_key.trim().is_empty() {
            return Err(Error::Config("Supabase key is empty".to_string()));
        }

        let mut storage = Self {
            client: Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            columns: HashSet::new(),
        };

        match storage.fetch_columns().await {
            Ok(columns) if !columns.is_empty() => {
                info!(table, columns = columns.len(), "📋 Discovered table columns");
                storage.columns = columns;
            }
            Ok(_) => warn!(table, "table not found in schema, column filtering disabled"),
            Err(e) => warn!(table, error = %e, "schema discovery failed, column filtering disabled"),
        }
        Ok(storage)
    }

    pub fn columns(&self) -> &HashSet<String> {
        &self.columns
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn fetch_columns(&self) -> Result<HashSet<String>> {
        let response = self.request(Method::GET, "").send().await?.error_for_status()?;
        let document: Value = response.json().await?;
        Ok(declared_columns(&document, &self.table))
    }

    async fn stored_rows(&self, links: &[&str]) -> Result<HashMap<String, Row>> {
        let mut stored = HashMap::new();
        for chunk in links.chunks(LOOKUP_CHUNK) {
            let response = self
                .request(Method::GET, &self.table)
                .query(&[("select", "*".to_string()), ("link", in_filter(chunk))])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Error::Storage(format!("lookup failed with status {}", response.status())));
            }
            let rows: Vec<Row> = response.json().await?;
            for row in rows {
                if let Some(link) = row.get("link").and_then(Value::as_str) {
                    stored.insert(link.to_string(), row);
                }
            }
        }
        Ok(stored)
    }

    async fn select(&self, query: &[(&str, String)]) -> Result<Vec<Article>> {
        let response = self.request(Method::GET, &self.table).query(query).send().await?;
        if !response.status().is_success() {
            return Err(Error::Storage(format!("select failed with status {}", response.status())));
        }
        let rows: Vec<Row> = response.json().await?;
        rows.into_iter().map(row_to_article).collect()
    }
}

#[async_trait]
impl ArticleStorage for SupabaseStorage {
    async fn upsert_articles(&self, articles: &[Article]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        if articles.is_empty() {
            return Ok(outcome);
        }

        let links: Vec<&str> = articles.iter().map(Article::link).collect();
        let stored = self.stored_rows(&links).await?;

        let mut pending: Vec<(ArticleStatus, Row)> = Vec::new();
        for article in articles {
            let row = match article_to_row(article) {
                Ok(row) => filter_columns(row, &self.columns),
                Err(e) => {
                    warn!(link = article.link(), error = %e, "rejecting row");
                    outcome.record(ArticleStatus::Rejected);
                    continue;
                }
            };
            if !row.contains_key("link") {
                outcome.record(ArticleStatus::Rejected);
                continue;
            }
            match stored.get(article.link()) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    if merge_row(&mut merged, row.clone()) {
                        pending.push((ArticleStatus::Updated, row));
                    } else {
                        outcome.record(ArticleStatus::Unchanged);
                    }
                }
                None => pending.push((ArticleStatus::New, row)),
            }
        }

        if pending.is_empty() {
            return Ok(outcome);
        }

        // PostgREST requires every object of a bulk insert to carry the same keys
        for (keys, group) in group_by_keys(pending) {
            let payload: Vec<&Row> = group.iter().map(|(_, row)| row).collect();
            let response = self
                .request(Method::POST, &self.table)
                .query(&[("on_conflict", "link")])
                .header("Prefer", "resolution=merge-duplicates,return=representation")
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                debug!(rows = group.len(), keys = keys.len(), "upsert accepted");
                for (row_status, _) in &group {
                    outcome.record(*row_status);
                }
            } else if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                warn!(%status, body = %body, rows = group.len(), "upsert rejected");
                for _ in &group {
                    outcome.record(ArticleStatus::Rejected);
                }
            } else {
                return Err(Error::Storage(format!("upsert failed with status {}", status)));
            }
        }
        Ok(outcome)
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        let mut found = self
            .select(&[("select", "*".to_string()), ("link", format!("eq.{}", link)), ("limit", "1".to_string())])
            .await?;
        Ok(found.pop())
    }

    async fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_ago));
        self.select(&[
            ("select", "*".to_string()),
            ("published", format!("gte.{}", cutoff.to_rfc3339())),
            ("order", "published.desc".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .request(Method::GET, &self.table)
            .query(&[("select", "link")])
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE) {
            return Err(Error::Storage(format!("count failed with status {}", status)));
        }
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| Error::Storage("count response carried no content-range".to_string()))
    }
}

/// Splits rows into batches whose objects share one key set, in key order.
pub fn group_by_keys(rows: Vec<(ArticleStatus, Row)>) -> BTreeMap<Vec<String>, Vec<(ArticleStatus, Row)>> {
    let mut groups: BTreeMap<Vec<String>, Vec<(ArticleStatus, Row)>> = BTreeMap::new();
    for (status, row) in rows {
        let mut keys: Vec<String> = row.keys().cloned().collect();
        keys.sort();
        groups.entry(keys).or_default().push((status, row));
    }
    groups
}

/// Column names of `table` in a PostgREST OpenAPI document.
pub fn declared_columns(document: &Value, table: &str) -> HashSet<String> {
    document
        .get("definitions")
        .and_then(|d| d.get(table))
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

/// PostgREST `in.(...)` filter with every value quoted.
pub fn in_filter(values: &[&str]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
pub fn content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}
