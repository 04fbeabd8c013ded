use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tb_core::{Article, Error, Result};
use tracing::{info, warn};

use crate::scrapers::Scraper;

type BoxedScraper = Box<dyn Scraper>;

/// Articles gathered from every source plus what each source contributed.
#[derive(Debug, Default, Serialize)]
pub struct CollectionReport {
    #[serde(skip)]
    pub articles: Vec<Article>,
    /// Valid articles per successful source, in registration order.
    pub per_source: Vec<(String, usize)>,
    /// Failed sources with the error message.
    pub failures: Vec<(String, String)>,
    /// Articles dropped for an empty link or title.
    pub dropped: usize,
}

impl CollectionReport {
    pub fn succeeded(&self) -> usize {
        self.per_source.len()
    }
}

pub struct ScraperManager {
    scrapers: Vec<BoxedScraper>,
    source_timeout: Duration,
}

impl ScraperManager {
    pub fn new(source_timeout: Duration) -> Self {
        Self {
            scrapers: Vec::new(),
            source_timeout,
        }
    }

    pub fn with_scrapers(scrapers: Vec<BoxedScraper>, source_timeout: Duration) -> Self {
        Self { scrapers, source_timeout }
    }

    pub fn add_scraper(&mut self, scraper: BoxedScraper) {
        self.scrapers.push(scraper);
    }

    pub fn scrapers(&self) -> &[BoxedScraper] {
        &self.scrapers
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }

    /// Keeps only the scrapers answering to one of `names`, matched against
    /// CLI names or the display name, case-insensitively.
    pub fn retain_sources(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.scrapers.iter().any(|s| answers_to(&**s, name)) {
                return Err(Error::Config(format!("No scraper found for source: {}", name)));
            }
        }
        self.scrapers.retain(|s| names.iter().any(|n| answers_to(&**s, n)));
        Ok(())
    }

    /// Runs every source concurrently. Failed or timed out sources are
    /// logged and left out. Never fails as a whole.
    pub async fn collect_all(&self, days_ago: u32) -> CollectionReport {
        info!(sources = self.scrapers.len(), days_ago, "🦗 Collecting articles");

        let tasks = self.scrapers.iter().map(|scraper| async move {
            let outcome = match tokio::time::timeout(self.source_timeout, scraper.collect(days_ago)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Scraping(format!("timed out after {}s", self.source_timeout.as_secs()))),
            };
            (scraper.source_metadata(), outcome)
        });

        let mut report = CollectionReport::default();
        for (meta, outcome) in join_all(tasks).await {
            match outcome {
                Ok(articles) => {
                    let total = articles.len();
                    let valid: Vec<Article> = articles
                        .into_iter()
                        .filter(|a| {
                            let ok = !a.link().trim().is_empty() && !a.title.trim().is_empty();
                            if !ok {
                                warn!(source = meta.name, link = %a.link(), "dropping article without link or title");
                            }
                            ok
                        })
                        .collect();
                    report.dropped += total - valid.len();
                    info!("{} {} collected {} articles", meta.emoji, meta.name, valid.len());
                    report.per_source.push((meta.name.to_string(), valid.len()));
                    report.articles.extend(valid);
                }
                Err(e) => {
                    warn!(source = meta.name, error = %e, "source failed, excluding it from this cycle");
                    report.failures.push((meta.name.to_string(), e.to_string()));
                }
            }
        }

        if report.per_source.is_empty() && !self.scrapers.is_empty() {
            warn!("every source failed, nothing collected");
        }
        info!(
            articles = report.articles.len(),
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            "✨ Collection finished"
        );
        report
    }

    /// Printable listing of the registered sources, grouped by kind.
    pub fn list_scrapers(&self) -> String {
        let mut out = String::new();
        let mut kinds: Vec<&str> = Vec::new();
        for scraper in &self.scrapers {
            let kind = scraper.source_metadata().kind.name();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        for kind in kinds {
            out.push_str(&format!("{}:\n", kind));
            for scraper in self.scrapers.iter().filter(|s| s.source_metadata().kind.name() == kind) {
                let meta = scraper.source_metadata();
                out.push_str(&format!("  {} {} ({})\n", meta.emoji, meta.name, scraper.cli_names().join(", ")));
            }
        }
        out
    }
}

fn answers_to(scraper: &dyn Scraper, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    scraper.source_metadata().name.to_lowercase() == name || scraper.cli_names().iter().any(|n| *n == name)
}
