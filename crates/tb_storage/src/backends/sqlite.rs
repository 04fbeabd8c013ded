use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row as _;
use tb_core::{Article, ArticleStatus, ArticleStorage, Error, Result, UpsertOutcome};

use crate::{article_to_row, merge_row, row_to_article, Row};

pub const DEFAULT_PATH: &str = "articles.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        link TEXT PRIMARY KEY,
        published TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS articles_published ON articles (published)",
];

fn storage_error(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

fn sortable_timestamp(published: chrono::DateTime<Utc>) -> String {
    published.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new().filename(db_path).create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| storage_error("failed to connect to database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| storage_error(&format!("failed to run migration {}", i), e))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn stored_row(&self, link: &str) -> Result<Option<Row>> {
        let row = sqlx::query("SELECT data FROM articles WHERE link = ?")
            .bind(link)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| storage_error("failed to read article", e))?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_one(&self, article: &Article) -> Result<ArticleStatus> {
        let incoming = article_to_row(article)?;
        let (status, row) = match self.stored_row(article.link()).await? {
            Some(mut existing) => {
                if !merge_row(&mut existing, incoming) {
                    return Ok(ArticleStatus::Unchanged);
                }
                (ArticleStatus::Updated, existing)
            }
            None => (ArticleStatus::New, incoming),
        };

        sqlx::query(
            r#"
            INSERT INTO articles (link, published, data)
            VALUES (?, ?, ?)
            ON CONFLICT(link) DO UPDATE SET
                published = excluded.published,
                data = excluded.data
            "#,
        )
        .bind(article.link())
        .bind(sortable_timestamp(article.published))
        .bind(serde_json::to_string(&row)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_error("failed to store article", e))?;

        Ok(status)
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn upsert_articles(&self, articles: &[Article]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        for article in articles {
            match self.upsert_one(article).await {
                Ok(status) => outcome.record(status),
                Err(Error::Storage(e)) => return Err(Error::Storage(e)),
                Err(e) => {
                    tracing::warn!(link = article.link(), error = %e, "rejecting row");
                    outcome.record(ArticleStatus::Rejected);
                }
            }
        }
        Ok(outcome)
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        self.stored_row(link).await?.map(row_to_article).transpose()
    }

    async fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_ago));
        let rows = sqlx::query(
            r#"
            SELECT data FROM articles
            WHERE published >= ?
            ORDER BY published DESC
            LIMIT ?
            "#,
        )
        .bind(sortable_timestamp(cutoff))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("failed to fetch recent articles", e))?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.get("data");
                row_to_article(serde_json::from_str(&data)?)
            })
            .collect()
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| storage_error("failed to count articles", e))?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn article(link: &str, days_old: i64) -> Article {
        Article::new(link, "SQLite article", Utc::now() - Duration::days(days_old), "Test").unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_upsert_and_fetch() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();

        let mut articles = vec![
            article("https://example.com/a", 0),
            article("https://example.com/b", 3),
            article("https://example.com/old", 30),
        ];
        let first = storage.upsert_articles(&articles).await.unwrap();
        assert_eq!(first.inserted, 3);

        let second = storage.upsert_articles(&articles).await.unwrap();
        assert_eq!(second.written(), 0);

        articles[0].set_heat_score(Some(61.0));
        let third = storage.upsert_articles(&articles[..1]).await.unwrap();
        assert_eq!(third.updated, 1);

        assert_eq!(storage.count().await.unwrap(), 3);
        let recent = storage.fetch_recent(7, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].heat_score(), Some(61.0));
        assert_eq!(storage.db_path(), db_path.as_path());
    }
}
