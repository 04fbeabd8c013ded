use std::str::FromStr;

use tb_core::config::DedupConfig;
use tb_core::{Article, Error, Result};

pub mod cluster;
pub mod overlap;
pub mod text;

pub use cluster::{AggregationStats, EventClusterer, EventGroup};
pub use overlap::TitleOverlapFilter;

/// Collapses near-duplicate articles. Never returns more articles than it was given.
pub trait Deduplicate: Send + Sync {
    fn name(&self) -> &str;

    fn deduplicate(&self, articles: Vec<Article>) -> Vec<Article>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupStrategy {
    Clustering,
    TitleOverlap,
}

impl FromStr for DedupStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "clustering" | "cluster" => Ok(DedupStrategy::Clustering),
            "title-overlap" | "overlap" => Ok(DedupStrategy::TitleOverlap),
            other => Err(Error::Config(format!("unknown dedup strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Deduplicator {
    Clustering(EventClusterer),
    TitleOverlap(TitleOverlapFilter),
}

impl Deduplicator {
    pub fn new(strategy: DedupStrategy, config: &DedupConfig) -> Self {
        match strategy {
            DedupStrategy::Clustering => Deduplicator::Clustering(EventClusterer::from_config(config)),
            DedupStrategy::TitleOverlap => Deduplicator::TitleOverlap(TitleOverlapFilter::from_config(config)),
        }
    }

    pub fn strategy(&self) -> DedupStrategy {
        match self {
            Deduplicator::Clustering(_) => DedupStrategy::Clustering,
            Deduplicator::TitleOverlap(_) => DedupStrategy::TitleOverlap,
        }
    }
}

impl Deduplicate for Deduplicator {
    fn name(&self) -> &str {
        match self {
            Deduplicator::Clustering(c) => c.name(),
            Deduplicator::TitleOverlap(f) => f.name(),
        }
    }

    fn deduplicate(&self, articles: Vec<Article>) -> Vec<Article> {
        let before = articles.len();
        let output = match self {
            Deduplicator::Clustering(c) => c.deduplicate(articles),
            Deduplicator::TitleOverlap(f) => f.deduplicate(articles),
        };
        tracing::info!(strategy = self.name(), before, after = output.len(), "🧹 Deduplicated articles");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_strategy_selection() {
        let config = DedupConfig::default();
        let clustering = Deduplicator::new("clustering".parse().unwrap(), &config);
        assert_eq!(clustering.strategy(), DedupStrategy::Clustering);
        assert_eq!(clustering.name(), "clustering");

        let overlap = Deduplicator::new(DedupStrategy::TitleOverlap, &config);
        assert_eq!(overlap.name(), "title-overlap");

        assert!("semantic".parse::<DedupStrategy>().is_err());
    }

    #[test]
    fn test_both_strategies_never_grow() {
        let config = DedupConfig::default();
        let input: Vec<Article> = [
            "OpenAI releases GPT-5",
            "OpenAI Releases GPT 5",
            "NVIDIA reports record quarter",
            "Hugging Face launches new hub features",
        ]
        .iter()
        .enumerate()
        .map(|(i, t)| Article::new(&format!("https://example.com/{}", i), *t, Utc::now(), "Test").unwrap())
        .collect();

        for strategy in [DedupStrategy::Clustering, DedupStrategy::TitleOverlap] {
            let output = Deduplicator::new(strategy, &config).deduplicate(input.clone());
            assert!(output.len() <= input.len());
            assert_eq!(output[0].title, "OpenAI releases GPT-5");
        }
    }
}
