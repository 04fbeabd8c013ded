use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tb_core::{Article, ArticleStorage, Result, UpsertOutcome};
use tokio::sync::RwLock;

use crate::RowTable;

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    table: Arc<RwLock<RowTable>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only keeps the given columns, like a remote table with a fixed schema.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: HashSet<String> = columns.into_iter().map(Into::into).collect();
        Self {
            table: Arc::new(RwLock::new(RowTable::new(columns))),
        }
    }

    /// Marks a stored article as a favourite, the way an external reader would.
    pub async fn set_favorite(&self, link: &str, favorite: bool) -> bool {
        let mut table = self.table.write().await;
        if !table.contains(link) {
            return false;
        }
        let mut row = crate::Row::new();
        row.insert("link".to_string(), link.into());
        row.insert("is_favorite".to_string(), favorite.into());
        table.upsert_row(row);
        true
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    async fn upsert_articles(&self, articles: &[Article]) -> Result<UpsertOutcome> {
        let mut table = self.table.write().await;
        let mut outcome = UpsertOutcome::default();
        for article in articles {
            outcome.record(table.upsert(article));
        }
        Ok(outcome)
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        self.table.read().await.get(link)
    }

    async fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        self.table.read().await.recent(days_ago, limit)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn article(link: &str, days_old: i64) -> Article {
        Article::new(link, format!("Article at {}", link), Utc::now() - Duration::days(days_old), "Test").unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let storage = MemoryStorage::new();
        let articles = vec![
            article("https://example.com/a", 0),
            article("https://example.com/b", 0),
            article("https://example.com/c", 0),
        ];

        let first = storage.upsert_articles(&articles).await.unwrap();
        assert_eq!(first.inserted, 3);

        let second = storage.upsert_articles(&articles).await.unwrap();
        assert_eq!(second.written(), 0);
        assert_eq!(second.skipped(), 3);
        assert_eq!(storage.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let storage = MemoryStorage::new();
        let mut a = article("https://example.com/a", 0);
        storage.upsert_articles(&[a.clone()]).await.unwrap();
        assert!(storage.set_favorite(a.link(), true).await);

        a.trend_tag = Some("cost".to_string());
        let outcome = storage.upsert_articles(&[a.clone()]).await.unwrap();
        assert_eq!(outcome.updated, 1);

        let stored = storage.get_by_link(a.link()).await.unwrap().unwrap();
        assert_eq!(stored.trend_tag.as_deref(), Some("cost"));
        assert!(stored.is_favorite);
    }

    #[tokio::test]
    async fn test_fetch_recent_orders_and_limits() {
        let storage = MemoryStorage::new();
        storage
            .upsert_articles(&[
                article("https://example.com/old", 10),
                article("https://example.com/yesterday", 1),
                article("https://example.com/today", 0),
            ])
            .await
            .unwrap();

        let recent = storage.fetch_recent(7, 10).await.unwrap();
        let links: Vec<&str> = recent.iter().map(Article::link).collect();
        assert_eq!(links, vec!["https://example.com/today", "https://example.com/yesterday"]);

        assert_eq!(storage.fetch_recent(7, 1).await.unwrap().len(), 1);
        assert!(storage.get_by_link("https://example.com/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undeclared_columns_are_dropped() {
        let storage = MemoryStorage::with_columns(["id", "link", "title", "published", "source"]);
        let mut a = article("https://example.com/a", 0);
        a.tags = vec!["cost".to_string()];
        let outcome = storage.upsert_articles(&[a.clone()]).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert!(storage.get_by_link(a.link()).await.unwrap().unwrap().tags.is_empty());
    }
}
