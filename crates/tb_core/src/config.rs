use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

impl FeedConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Reads a JSON array of `{ "name": ..., "url": ... }` objects.
pub fn load_feeds(path: &Path) -> Result<Vec<FeedConfig>> {
    let raw = std::fs::read_to_string(path)?;
    let feeds: Vec<FeedConfig> = serde_json::from_str(&raw)?;
    if feeds.is_empty() {
        return Err(Error::Config(format!("feed list {} is empty", path.display())));
    }
    Ok(feeds)
}

pub fn default_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig::new("OpenAI Blog", "https://openai.com/blog/rss"),
        FeedConfig::new("Google AI Blog", "https://blog.google/technology/ai/rss"),
    ]
}

#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub categories: Vec<String>,
    pub max_results_per_category: usize,
    pub category_delay: Duration,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            categories: vec!["cs.AI".to_string(), "cs.LG".to_string(), "cs.CL".to_string()],
            max_results_per_category: 20,
            category_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RssConfig {
    pub feeds: Vec<FeedConfig>,
    pub max_entries_per_feed: usize,
    pub fetch_full_content: bool,
    pub skip_full_content_for_arxiv: bool,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            max_entries_per_feed: 100,
            fetch_full_content: true,
            skip_full_content_for_arxiv: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerperConfig {
    pub api_key: Option<String>,
    pub queries: Vec<String>,
    pub num_results: usize,
    pub max_retries: u32,
}

impl Default for SerperConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            queries: Vec::new(),
            num_results: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterLinkage {
    /// Single pass, an article joins the first group whose anchor it matches.
    #[default]
    Anchor,
    /// Union-find over the same pairwise predicate.
    Transitive,
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub linkage: ClusterLinkage,
    pub min_overlap: usize,
    pub max_title_length_delta: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            linkage: ClusterLinkage::Anchor,
            min_overlap: 3,
            max_title_length_delta: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub content_char_limit: usize,
    pub request_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            content_char_limit: 3000,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeatConfig {
    pub primary_threshold: f64,
    pub relaxed_threshold: f64,
    pub min_viable: usize,
    pub max_articles: usize,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            primary_threshold: 30.0,
            relaxed_threshold: 20.0,
            min_viable: 10,
            max_articles: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub days_ago: u32,
    pub source_timeout: Duration,
    pub arxiv: ArxivConfig,
    pub rss: RssConfig,
    pub serper: SerperConfig,
    pub dedup: DedupConfig,
    pub enrichment: EnrichmentConfig,
    pub heat: HeatConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            days_ago: 1,
            source_timeout: Duration::from_secs(120),
            arxiv: ArxivConfig::default(),
            rss: RssConfig::default(),
            serper: SerperConfig::default(),
            dedup: DedupConfig::default(),
            enrichment: EnrichmentConfig::default(),
            heat: HeatConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Rejects settings no component could run with.
    pub fn validate(&self) -> Result<()> {
        if self.days_ago == 0 {
            return Err(Error::Config("days_ago must be at least 1".to_string()));
        }
        if self.source_timeout.is_zero() {
            return Err(Error::Config("source_timeout must be positive".to_string()));
        }
        let threshold = self.dedup.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Config(format!(
                "similarity_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.dedup.min_overlap == 0 {
            return Err(Error::Config("min_overlap must be at least 1".to_string()));
        }
        if self.enrichment.batch_size == 0 {
            return Err(Error::Config("enrichment batch_size must be at least 1".to_string()));
        }
        if self.enrichment.content_char_limit == 0 {
            return Err(Error::Config("content_char_limit must be at least 1".to_string()));
        }
        let heat = &self.heat;
        for (name, value) in [("primary_threshold", heat.primary_threshold), ("relaxed_threshold", heat.relaxed_threshold)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!("{} must be in [0, 100], got {}", name, value)));
            }
        }
        if heat.relaxed_threshold > heat.primary_threshold {
            return Err(Error::Config(format!(
                "relaxed_threshold ({}) must not exceed primary_threshold ({})",
                heat.relaxed_threshold, heat.primary_threshold
            )));
        }
        if heat.max_articles == 0 {
            return Err(Error::Config("max_articles must be at least 1".to_string()));
        }
        if self.arxiv.categories.is_empty() && self.rss.feeds.is_empty() && self.serper.queries.is_empty() {
            return Err(Error::Config("no sources configured".to_string()));
        }
        if !self.serper.queries.is_empty() && self.serper.api_key.is_none() {
            return Err(Error::Config("serper queries configured without SERPER_API_KEY".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enrichment.batch_size, 10);
        assert_eq!(config.heat.primary_threshold, 30.0);
        assert_eq!(config.heat.relaxed_threshold, 20.0);
        assert_eq!(config.heat.max_articles, 30);
        assert_eq!(config.heat.min_viable, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.enrichment.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.dedup.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.heat.relaxed_threshold = 40.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.arxiv.categories.clear();
        config.rss.feeds.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_feeds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "{}",
            r#"[{"name": "OpenAI Blog", "url": "https://openai.com/blog/rss"}]"#
        )
        .unwrap();
        let feeds = load_feeds(file.path()).unwrap();
        assert_eq!(feeds, vec![FeedConfig::new("OpenAI Blog", "https://openai.com/blog/rss")]);
    }

    #[test]
    fn test_load_feeds_rejects_empty_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[]").unwrap();
        assert!(matches!(load_feeds(file.path()), Err(Error::Config(_))));
    }
}
