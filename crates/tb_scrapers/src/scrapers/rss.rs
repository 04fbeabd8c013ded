use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use scraper::Html;
use tb_core::config::{FeedConfig, RssConfig};
use tb_core::types::collapse_whitespace;
use tb_core::{Article, Error, Result};
use tracing::{debug, info, warn};

use super::utils;
use super::{Scraper, SourceKind, SourceMetadata};

const CONTENT_SELECTORS: &str = ".entry-content, #content, .post-content, .article-content, .post-body";

/// Article pages fetched at once per feed.
const MAX_CONCURRENT_PAGE_FETCHES: usize = 8;

/// Extracted page text shorter than this is ignored.
const MIN_CONTENT_CHARS: usize = 100;

/// Articles from configured RSS and Atom feeds.
#[derive(Debug, Clone)]
pub struct RssScraper {
    config: RssConfig,
}

impl RssScraper {
    pub fn new(config: RssConfig) -> Self {
        Self { config }
    }

    async fn collect_feed(&self, client: &reqwest::Client, feed: &FeedConfig, cutoff: DateTime<Utc>) -> Result<Vec<Article>> {
        let response = client.get(&feed.url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        let articles = parse_feed(&body, feed, cutoff, self.config.max_entries_per_feed, Utc::now())?;

        let fetch_pages = self.config.fetch_full_content
            && !(self.config.skip_full_content_for_arxiv && feed.url.contains("arxiv.org"));
        if !fetch_pages {
            debug!(feed = %feed.name, "skipping full content fetch");
            return Ok(articles);
        }

        Ok(stream::iter(articles)
            .map(|article| async move {
                match fetch_main_text(client, article.link()).await {
                    Some(content) => article.with_content(content),
                    None => article,
                }
            })
            .buffered(MAX_CONCURRENT_PAGE_FETCHES)
            .collect::<Vec<_>>()
            .await)
    }
}

/// Parses a feed document. Entries without a date count as published at `now`.
pub fn parse_feed(
    body: &[u8],
    feed: &FeedConfig,
    cutoff: DateTime<Utc>,
    max_entries: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let parsed = feed_rs::parser::parse(body).map_err(|e| Error::Scraping(format!("Failed to parse feed {}: {}", feed.name, e)))?;

    let mut articles = Vec::new();
    for entry in parsed.entries.into_iter().take(max_entries) {
        let published = entry.published.or(entry.updated).unwrap_or(now);
        if published < cutoff {
            continue;
        }

        let Some(link) = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        else {
            debug!(feed = %feed.name, id = %entry.id, "skipping entry without a link");
            continue;
        };
        let title = entry.title.map(|t| collapse_whitespace(&t.content)).unwrap_or_default();
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|s| utils::strip_html(&s))
            .unwrap_or_default();

        match Article::new(&link, title, published, feed.name.clone()) {
            Ok(article) => articles.push(
                article
                    .with_summary(summary)
                    .with_authors(entry.authors.into_iter().map(|a| a.name).collect())
                    .with_categories(entry.categories.into_iter().map(|c| c.label.unwrap_or(c.term)).collect()),
            ),
            Err(e) => warn!(feed = %feed.name, link = %link, error = %e, "skipping entry with invalid link"),
        }
    }
    Ok(articles)
}

/// Main text of an article page: known content containers first, then every paragraph.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let from_containers = utils::extract_texts(&document, CONTENT_SELECTORS)
        .ok()
        .and_then(|texts| texts.into_iter().find(|t| t.chars().count() > MIN_CONTENT_CHARS));
    if from_containers.is_some() {
        return from_containers;
    }

    let paragraphs = utils::extract_texts(&document, "p").ok()?.join("\n");
    (paragraphs.chars().count() > MIN_CONTENT_CHARS).then_some(paragraphs)
}

async fn fetch_main_text(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            warn!(url, error = %e, "failed to fetch article page");
            return None;
        }
    };
    let html = response.text().await.ok()?;
    extract_main_text(&html)
}

#[async_trait]
impl Scraper for RssScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "RSS",
            emoji: "📰",
            kind: SourceKind::Feed,
        }
    }

    fn cli_names(&self) -> Vec<&str> {
        vec!["rss", "feeds"]
    }

    async fn collect(&self, days_ago: u32) -> Result<Vec<Article>> {
        let client = utils::http_client(Duration::from_secs(10))?;
        let cutoff = utils::cutoff(days_ago);

        let mut articles = Vec::new();
        let mut failures = 0;
        for feed in &self.config.feeds {
            match self.collect_feed(&client, feed, cutoff).await {
                Ok(entries) => {
                    info!(feed = %feed.name, articles = entries.len(), "📰 Feed collected");
                    articles.extend(entries);
                }
                Err(e) => {
                    failures += 1;
                    warn!(feed = %feed.name, error = %e, "feed failed, continuing");
                }
            }
        }

        if failures > 0 && failures == self.config.feeds.len() {
            return Err(Error::Scraping(format!("all {} feeds failed", failures)));
        }
        Ok(articles)
    }
}
