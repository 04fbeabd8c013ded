use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use tb_core::{Article, ArticleStatus, ArticleStorage, Error, Result};

pub mod backends;

pub use backends::*;

/// One persisted article as a flat JSON object.
pub type Row = Map<String, Value>;

/// Fields the pipeline never writes.
const EXTERNAL_FIELDS: &[&str] = &["is_favorite"];

/// Builds the upsert payload for an article. Null and empty fields are left
/// out so they never erase values already stored.
pub fn article_to_row(article: &Article) -> Result<Row> {
    let Value::Object(mut row) = serde_json::to_value(article)? else {
        return Err(Error::Storage("article did not serialize to an object".to_string()));
    };
    row.retain(|key, value| !EXTERNAL_FIELDS.contains(&key.as_str()) && !is_blank(value));
    Ok(row)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub fn row_to_article(row: Row) -> Result<Article> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Drops fields the target schema does not declare. No declared columns means no filtering.
pub fn filter_columns(mut row: Row, columns: &HashSet<String>) -> Row {
    if !columns.is_empty() {
        row.retain(|key, _| columns.contains(key));
    }
    row
}

/// Overwrites `existing` field by field. Returns whether anything changed.
pub fn merge_row(existing: &mut Row, incoming: Row) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        if existing.get(&key) != Some(&value) {
            existing.insert(key, value);
            changed = true;
        }
    }
    changed
}

/// Keeps the first article for each link.
pub fn dedupe_by_link(articles: &[Article]) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .iter()
        .filter(|a| seen.insert(a.link().to_string()))
        .cloned()
        .collect()
}

fn row_link(row: &Row) -> Option<&str> {
    row.get("link").and_then(Value::as_str).filter(|l| !l.is_empty())
}

fn row_published(row: &Row) -> Option<chrono::DateTime<Utc>> {
    row.get("published")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Rows keyed by link with merge-on-conflict. Shared by the in-process backends.
#[derive(Debug, Clone, Default)]
pub struct RowTable {
    rows: BTreeMap<String, Row>,
    columns: HashSet<String>,
}

impl RowTable {
    pub fn new(columns: HashSet<String>) -> Self {
        Self {
            rows: BTreeMap::new(),
            columns,
        }
    }

    pub fn from_rows(rows: Vec<Row>, columns: HashSet<String>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            if let Some(link) = row_link(&row) {
                table.rows.insert(link.to_string(), row);
            }
        }
        table
    }

    pub fn upsert(&mut self, article: &Article) -> ArticleStatus {
        let row = match article_to_row(article) {
            Ok(row) => filter_columns(row, &self.columns),
            Err(e) => {
                tracing::warn!(link = article.link(), error = %e, "rejecting row");
                return ArticleStatus::Rejected;
            }
        };
        self.upsert_row(row)
    }

    pub fn upsert_row(&mut self, row: Row) -> ArticleStatus {
        let Some(link) = row_link(&row).map(str::to_string) else {
            return ArticleStatus::Rejected;
        };
        match self.rows.get_mut(&link) {
            Some(existing) => {
                if merge_row(existing, row) {
                    ArticleStatus::Updated
                } else {
                    ArticleStatus::Unchanged
                }
            }
            None => {
                self.rows.insert(link, row);
                ArticleStatus::New
            }
        }
    }

    pub fn get(&self, link: &str) -> Result<Option<Article>> {
        self.rows.get(link).cloned().map(row_to_article).transpose()
    }

    pub fn recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_ago));
        let mut rows: Vec<(chrono::DateTime<Utc>, &Row)> = self
            .rows
            .values()
            .filter_map(|row| row_published(row).map(|p| (p, row)))
            .filter(|(published, _)| *published >= cutoff)
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter()
            .take(limit)
            .map(|(_, row)| row_to_article(row.clone()))
            .collect()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.rows.contains_key(link)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Memory,
    File,
    Sqlite,
    Supabase,
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" | "json" => Ok(StorageKind::File),
            "sqlite" => Ok(StorageKind::Sqlite),
            "supabase" | "postgrest" => Ok(StorageKind::Supabase),
            other => Err(Error::Config(format!("unknown storage backend: {}", other))),
        }
    }
}

/// Connection settings for [`create_storage`].
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: Option<String>,
}

impl StorageOptions {
    /// Checks the settings `kind` needs without opening anything.
    pub fn validate(&self, kind: StorageKind) -> Result<()> {
        match kind {
            StorageKind::Memory | StorageKind::File => Ok(()),
            #[cfg(feature = "sqlite")]
            StorageKind::Sqlite => Ok(()),
            #[cfg(not(feature = "sqlite"))]
            StorageKind::Sqlite => Err(Error::Config(
                "sqlite storage requires building with the `sqlite` feature".to_string(),
            )),
            StorageKind::Supabase => {
                let url = self
                    .url
                    .as_deref()
                    .ok_or_else(|| Error::Config("SUPABASE_URL is required for supabase storage".to_string()))?;
                url::Url::parse(url).map_err(|e| Error::Config(format!("invalid SUPABASE_URL {}: {}", url, e)))?;
                if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    return Err(Error::Config("a Supabase key is required for supabase storage".to_string()));
                }
                Ok(())
            }
        }
    }
}

pub async fn create_storage(kind: StorageKind, options: &StorageOptions) -> Result<Arc<dyn ArticleStorage>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageKind::File => {
            let path = options
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(backends::file::DEFAULT_PATH));
            Ok(Arc::new(FileStorage::open(path).await?))
        }
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => {
            let path = options
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(backends::sqlite::DEFAULT_PATH));
            Ok(Arc::new(SQLiteStorage::new_with_path(&path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => Err(Error::Config(
            "sqlite storage requires building with the `sqlite` feature".to_string(),
        )),
        StorageKind::Supabase => {
            let url = options
                .url
                .clone()
                .ok_or_else(|| Error::Config("SUPABASE_URL is required for supabase storage".to_string()))?;
            let key = options
                .api_key
                .clone()
                .ok_or_else(|| Error::Config("a Supabase key is required for supabase storage".to_string()))?;
            let table = options
                .table
                .clone()
                .unwrap_or_else(|| backends::supabase::DEFAULT_TABLE.to_string());
            Ok(Arc::new(SupabaseStorage::connect(&url, &key, &table).await?))
        }
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, dedupe_by_link, StorageKind, StorageOptions};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_options_validate() {
        let empty = StorageOptions::default();
        assert!(empty.validate(StorageKind::Memory).is_ok());
        assert!(empty.validate(StorageKind::File).is_ok());
        assert!(matches!(empty.validate(StorageKind::Supabase), Err(Error::Config(_))));

        let supabase = StorageOptions {
            url: Some("https://project.supabase.co".to_string()),
            api_key: Some("service".to_string()),
            ..Default::default()
        };
        assert!(supabase.validate(StorageKind::Supabase).is_ok());

        let blank_key = StorageOptions {
            api_key: Some("  ".to_string()),
            ..supabase.clone()
        };
        assert!(blank_key.validate(StorageKind::Supabase).is_err());

        let bad_url = StorageOptions {
            url: Some("not a url".to_string()),
            ..supabase
        };
        assert!(bad_url.validate(StorageKind::Supabase).is_err());
    }

    fn article(link: &str) -> Article {
        Article::new(link, "Title", Utc::now(), "Test").unwrap()
    }

    #[test]
    fn test_article_to_row_skips_blank_and_external_fields() {
        let mut a = article("https://example.com/a");
        a.is_favorite = true;
        let row = article_to_row(&a).unwrap();
        assert_eq!(row["link"], "https://example.com/a");
        assert!(!row.contains_key("is_favorite"));
        assert!(!row.contains_key("summary"));
        assert!(!row.contains_key("tags"));
        assert!(!row.contains_key("heat_score"));
    }

    #[test]
    fn test_filter_columns() {
        let row = article_to_row(&article("https://example.com/a")).unwrap();
        let columns: HashSet<String> = ["link", "title"].iter().map(|s| s.to_string()).collect();
        let filtered = filter_columns(row.clone(), &columns);
        assert_eq!(filtered.len(), 2);

        let unfiltered = filter_columns(row.clone(), &HashSet::new());
        assert_eq!(unfiltered, row);
    }

    #[test]
    fn test_merge_keeps_fields_missing_from_payload() {
        let mut enriched = article("https://example.com/a");
        enriched.tags = vec!["cost".to_string()];
        let mut stored = article_to_row(&enriched).unwrap();
        stored.insert("is_favorite".to_string(), Value::Bool(true));

        let mut bare = enriched.clone();
        bare.tags.clear();
        assert!(!merge_row(&mut stored, article_to_row(&bare).unwrap()));
        assert_eq!(stored["tags"], serde_json::json!(["cost"]));
        assert_eq!(stored["is_favorite"], Value::Bool(true));

        bare.title = "Retitled".to_string();
        assert!(merge_row(&mut stored, article_to_row(&bare).unwrap()));
        assert_eq!(stored["title"], "Retitled");
    }

    #[test]
    fn test_dedupe_by_link_keeps_first() {
        let mut first = article("https://example.com/a");
        first.title = "first".to_string();
        let mut second = article("https://example.com/a");
        second.title = "second".to_string();
        let other = article("https://example.com/b");

        let deduped = dedupe_by_link(&[first, second, other]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
    }

    #[test]
    fn test_row_table_statuses() {
        let mut table = RowTable::default();
        let mut a = article("https://example.com/a");
        assert_eq!(table.upsert(&a), ArticleStatus::New);
        assert_eq!(table.upsert(&a), ArticleStatus::Unchanged);
        a.set_heat_score(Some(50.0));
        assert_eq!(table.upsert(&a), ArticleStatus::Updated);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a.link()).unwrap().unwrap().heat_score(), Some(50.0));
    }

    #[test]
    fn test_row_table_rejects_rows_without_link_column() {
        let columns: HashSet<String> = ["title"].iter().map(|s| s.to_string()).collect();
        let mut table = RowTable::new(columns);
        assert_eq!(table.upsert(&article("https://example.com/a")), ArticleStatus::Rejected);
        assert!(table.is_empty());
    }

    #[test]
    fn test_storage_kind_from_str() {
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert_eq!("Supabase".parse::<StorageKind>().unwrap(), StorageKind::Supabase);
        assert!("qdrant".parse::<StorageKind>().is_err());
    }
}
