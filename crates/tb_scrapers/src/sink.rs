use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tb_core::{Article, ArticleSink, Entities, Result};
use tracing::info;

/// What a reader of the digest sees for one article.
#[derive(Debug, Serialize)]
pub struct DigestEntry<'a> {
    pub rank: usize,
    pub title: &'a str,
    pub link: &'a str,
    pub source: &'a str,
    pub published: DateTime<Utc>,
    pub heat_score: Option<f64>,
    pub trend_tag: Option<&'a str>,
    pub short_description: Option<String>,
    pub summary: Option<&'a str>,
    pub plain_summary: Option<&'a str>,
    pub key_points: &'a [String],
    pub tags: &'a [String],
    pub entities: &'a Entities,
}

impl<'a> DigestEntry<'a> {
    pub fn new(rank: usize, article: &'a Article) -> Self {
        Self {
            rank,
            title: &article.title,
            link: article.link(),
            source: &article.source,
            published: article.published,
            heat_score: article.heat_score(),
            trend_tag: article.trend_tag.as_deref(),
            short_description: article.short_description(),
            summary: article.summary_localized.as_deref(),
            plain_summary: article.plain_summary.as_deref(),
            key_points: &article.key_points,
            tags: &article.tags,
            entities: &article.entities,
        }
    }
}

#[derive(Debug, Serialize)]
struct Digest<'a> {
    date: NaiveDate,
    generated_at: DateTime<Utc>,
    count: usize,
    articles: Vec<DigestEntry<'a>>,
}

/// Writes the ranked delivery set to `<output_dir>/digest-YYYY-MM-DD.json`.
#[derive(Debug, Clone)]
pub struct JsonDigestSink {
    output_dir: PathBuf,
}

impl JsonDigestSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn digest_path(&self, date: NaiveDate) -> PathBuf {
        self.output_dir.join(format!("digest-{}.json", date.format("%Y-%m-%d")))
    }

    /// Writes the digest for `date`, replacing an earlier one from the same day.
    pub async fn write_digest(&self, articles: &[Article], date: NaiveDate) -> Result<PathBuf> {
        let digest = Digest {
            date,
            generated_at: Utc::now(),
            count: articles.len(),
            articles: articles
                .iter()
                .enumerate()
                .map(|(i, article)| DigestEntry::new(i + 1, article))
                .collect(),
        };
        let body = serde_json::to_vec_pretty(&digest)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.digest_path(date);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

#[async_trait]
impl ArticleSink for JsonDigestSink {
    fn name(&self) -> &str {
        "json-digest"
    }

    async fn deliver(&self, articles: &[Article]) -> Result<()> {
        let path = self.write_digest(articles, Utc::now().date_naive()).await?;
        info!(path = %path.display(), articles = articles.len(), "📬 Digest written");
        Ok(())
    }
}

/// Logs the delivery set instead of writing it anywhere.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl ArticleSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, articles: &[Article]) -> Result<()> {
        for (i, article) in articles.iter().enumerate() {
            info!(
                rank = i + 1,
                heat = article.heat_or_zero(),
                source = %article.source,
                "🔥 {}",
                article.title
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(link: &str, title: &str, heat: f64) -> Article {
        let mut article = Article::new(link, title, Utc::now(), "Test")
            .unwrap()
            .with_summary("A short summary.");
        article.set_heat_score(Some(heat));
        article.tags = vec!["capability".to_string()];
        article
    }

    #[tokio::test]
    async fn test_write_digest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDigestSink::new(dir.path().join("out"));
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let articles = vec![
            article("https://a.example.com/1", "Hot story", 90.0),
            article("https://b.example.com/2", "Warm story", 40.0),
        ];

        let path = sink.write_digest(&articles, date).await.unwrap();
        assert_eq!(path, dir.path().join("out").join("digest-2024-05-02.json"));

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["count"], 2);
        assert_eq!(written["date"], "2024-05-02");
        assert_eq!(written["articles"][0]["rank"], 1);
        assert_eq!(written["articles"][0]["title"], "Hot story");
        assert_eq!(written["articles"][0]["short_description"], "A short summary.");
        assert_eq!(written["articles"][1]["heat_score"], 40.0);
    }

    #[tokio::test]
    async fn test_deliver_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDigestSink::new(dir.path());
        sink.deliver(&[]).await.unwrap();
        assert!(sink.digest_path(Utc::now().date_naive()).exists());
        LogSink.deliver(&[]).await.unwrap();
    }
}
