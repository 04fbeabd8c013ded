use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tb_core::config::ArxivConfig;
use tb_core::types::collapse_whitespace;
use tb_core::{Article, Error, Result};
use tracing::{debug, info, warn};

use super::utils;
use super::{Scraper, SourceKind, SourceMetadata};

const API_URL: &str = "https://export.arxiv.org/api/query";
const SOURCE_NAME: &str = "arXiv API";

/// Recent papers from the arXiv listing API, one query per category.
#[derive(Debug, Clone)]
pub struct ArxivScraper {
    config: ArxivConfig,
    api_url: String,
}

impl ArxivScraper {
    pub fn new(config: ArxivConfig) -> Self {
        Self {
            config,
            api_url: API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn query_url(&self, category: &str) -> Result<url::Url> {
        let search_query = format!("cat:{}", category);
        let max_results = self.config.max_results_per_category.to_string();
        url::Url::parse_with_params(
            &self.api_url,
            &[
                ("search_query", search_query.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
                ("max_results", max_results.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid arXiv api url {}: {}", self.api_url, e)))
    }

    async fn collect_category(&self, client: &reqwest::Client, category: &str, cutoff: DateTime<Utc>) -> Result<Vec<Article>> {
        let url = self.query_url(category)?;
        let response = client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        parse_entries(&body, cutoff)
    }
}

/// Parses an arXiv Atom response, keeping papers published at or after `cutoff`.
pub fn parse_entries(xml: &[u8], cutoff: DateTime<Utc>) -> Result<Vec<Article>> {
    let feed = feed_rs::parser::parse(xml).map_err(|e| Error::Scraping(format!("Failed to parse arXiv feed: {}", e)))?;

    let mut articles = Vec::new();
    for entry in feed.entries {
        let Some(published) = entry.published else {
            debug!(id = %entry.id, "skipping paper without a published date");
            continue;
        };
        if published < cutoff {
            continue;
        }

        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| entry.id.clone());
        let title = entry.title.map(|t| collapse_whitespace(&t.content)).unwrap_or_default();
        let summary = entry.summary.map(|s| collapse_whitespace(&s.content)).unwrap_or_default();

        match Article::new(&link, title, published, SOURCE_NAME) {
            Ok(article) => articles.push(
                article
                    .with_summary(summary)
                    .with_authors(entry.authors.into_iter().map(|a| a.name).collect())
                    .with_categories(entry.categories.into_iter().map(|c| c.term).collect()),
            ),
            Err(e) => warn!(link = %link, error = %e, "skipping paper with invalid link"),
        }
    }
    Ok(articles)
}

#[async_trait]
impl Scraper for ArxivScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "arXiv",
            emoji: "📚",
            kind: SourceKind::Academic,
        }
    }

    fn cli_names(&self) -> Vec<&str> {
        vec!["arxiv"]
    }

    async fn collect(&self, days_ago: u32) -> Result<Vec<Article>> {
        let client = utils::http_client(Duration::from_secs(30))?;
        let cutoff = utils::cutoff(days_ago);

        let mut articles = Vec::new();
        let mut failures = 0;
        for (i, category) in self.config.categories.iter().enumerate() {
            if i > 0 && !self.config.category_delay.is_zero() {
                tokio::time::sleep(self.config.category_delay).await;
            }
            match self.collect_category(&client, category, cutoff).await {
                Ok(papers) => {
                    info!(category = %category, papers = papers.len(), "📚 arXiv category collected");
                    articles.extend(papers);
                }
                Err(e) => {
                    failures += 1;
                    warn!(category = %category, error = %e, "arXiv category failed, continuing");
                }
            }
        }

        if failures > 0 && failures == self.config.categories.len() {
            return Err(Error::Scraping(format!("all {} arXiv categories failed", failures)));
        }
        Ok(articles)
    }
}
