use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tb_core::{Article, Result, UpsertOutcome};
use tracing::debug;

use super::blocking::{BlockingStorage, SyncArticleStore};
use crate::{Row, RowTable};

pub const DEFAULT_PATH: &str = "articles.json";

/// Articles kept as a JSON array on disk. Every write rewrites the file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: RowTable,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows: Vec<Row> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Vec::new()
        };
        debug!(path = %path.display(), rows = rows.len(), "opened article file");
        Ok(Self {
            path,
            table: RowTable::from_rows(rows, HashSet::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let rows: Vec<&Row> = self.table.rows().collect();
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&rows)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SyncArticleStore for JsonFileStore {
    fn upsert_articles(&mut self, articles: &[Article]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        for article in articles {
            outcome.record(self.table.upsert(article));
        }
        if outcome.written() > 0 {
            self.save()?;
        }
        Ok(outcome)
    }

    fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        self.table.get(link)
    }

    fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        self.table.recent(days_ago, limit)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.table.len())
    }
}

pub type FileStorage = BlockingStorage<JsonFileStore>;

impl FileStorage {
    /// Opens the file on the blocking pool.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = tokio::task::spawn_blocking(move || JsonFileStore::open(path))
            .await
            .map_err(|e| tb_core::Error::Storage(format!("failed to open article file: {}", e)))??;
        Ok(BlockingStorage::new(store))
    }
}
