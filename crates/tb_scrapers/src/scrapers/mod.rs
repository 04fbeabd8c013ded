use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tb_core::config::PipelineConfig;
use tb_core::{Article, Result};

pub mod arxiv;
pub mod rss;
pub mod serper;

pub use arxiv::ArxivScraper;
pub use rss::RssScraper;
pub use serper::SerperScraper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Academic,
    Feed,
    Search,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Academic => "academic",
            SourceKind::Feed => "feed",
            SourceKind::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceMetadata {
    pub name: &'static str,
    pub emoji: &'static str,
    pub kind: SourceKind,
}

/// A source of articles. Holds no state between `collect` calls.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn source_metadata(&self) -> SourceMetadata;

    /// CLI shorthand names for this scraper
    fn cli_names(&self) -> Vec<&str> {
        vec![]
    }

    /// Articles published within the last `days_ago` days.
    async fn collect(&self, days_ago: u32) -> Result<Vec<Article>>;
}

/// The collectors enabled by `config`, in registration order.
pub fn default_scrapers(config: &PipelineConfig) -> Vec<Box<dyn Scraper>> {
    let mut scrapers: Vec<Box<dyn Scraper>> = Vec::new();
    if !config.arxiv.categories.is_empty() {
        scrapers.push(Box::new(ArxivScraper::new(config.arxiv.clone())));
    }
    if !config.rss.feeds.is_empty() {
        scrapers.push(Box::new(RssScraper::new(config.rss.clone())));
    }
    if let Some(scraper) = SerperScraper::from_config(&config.serper) {
        scrapers.push(Box::new(scraper));
    }
    scrapers
}

/// Common utilities for scrapers
pub(crate) mod utils {
    use super::*;
    use scraper::{Html, Node, Selector};
    use tb_core::Error;

    /// Elements that start a new run of text.
    const BLOCK_TAGS: &[&str] = &[
        "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th", "blockquote",
        "pre", "section", "article", "table",
    ];

    pub const USER_AGENT: &str = concat!("trendbrief/", env!("CARGO_PKG_VERSION"));

    pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?)
    }

    pub fn cutoff(days_ago: u32) -> DateTime<Utc> {
        Utc::now() - Duration::days(i64::from(days_ago))
    }

    pub fn selector(css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| Error::Scraping(format!("Invalid selector {}: {:?}", css, e)))
    }

    /// Whitespace-collapsed text of every element matching `css`.
    pub fn extract_texts(document: &Html, css: &str) -> Result<Vec<String>> {
        let selector = selector(css)?;
        Ok(document
            .select(&selector)
            .map(|el| tb_core::types::collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
            .collect())
    }

    /// Text of a feed summary, which may carry markup.
    pub fn strip_html(fragment: &str) -> String {
        let document = Html::parse_fragment(fragment);
        let mut text = String::new();
        for node in document.root_element().descendants() {
            match node.value() {
                Node::Text(t) => text.push_str(t),
                Node::Element(e) if BLOCK_TAGS.contains(&e.name()) => text.push(' '),
                _ => {}
            }
        }
        tb_core::types::collapse_whitespace(&text)
    }
}
