use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Article;
use crate::Result;

/// What happened to a single row during an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleStatus {
    New,
    Updated,
    Unchanged,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl UpsertOutcome {
    pub fn record(&mut self, status: ArticleStatus) {
        match status {
            ArticleStatus::New => self.inserted += 1,
            ArticleStatus::Updated => self.updated += 1,
            ArticleStatus::Unchanged => self.unchanged += 1,
            ArticleStatus::Rejected => self.rejected += 1,
        }
    }

    /// Rows inserted or updated.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    /// Rows left untouched, either unchanged or rejected by the backend.
    pub fn skipped(&self) -> usize {
        self.unchanged + self.rejected
    }
}

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Keyed upsert on `link` with per-field last-write-wins merge.
    /// Callers deduplicate by link before calling.
    async fn upsert_articles(&self, articles: &[Article]) -> Result<UpsertOutcome>;

    async fn get_by_link(&self, link: &str) -> Result<Option<Article>>;

    /// Articles published within the last `days_ago` days, newest first.
    async fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>>;

    async fn count(&self) -> Result<usize>;
}

/// Downstream consumer of the ranked delivery set.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, articles: &[Article]) -> Result<()>;
}
