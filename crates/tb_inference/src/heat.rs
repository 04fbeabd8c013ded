use tb_core::config::HeatConfig;
use tb_core::Article;
use tracing::{debug, info};

/// Reduces an enriched list to a bounded delivery set by heat score.
#[derive(Debug, Clone)]
pub struct HeatFilter {
    config: HeatConfig,
}

impl HeatFilter {
    pub fn new(config: HeatConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, articles: &[Article]) -> Vec<Article> {
        let mut retained = self.retain_at(articles, self.config.primary_threshold);
        if retained.len() < self.config.min_viable {
            debug!(
                retained = retained.len(),
                min_viable = self.config.min_viable,
                threshold = self.config.relaxed_threshold,
                "relaxing heat threshold"
            );
            retained = self.retain_at(articles, self.config.relaxed_threshold);
        }

        if retained.len() > self.config.max_articles {
            // stable sort keeps input order among equal scores
            retained.sort_by(|a, b| b.heat_or_zero().total_cmp(&a.heat_or_zero()));
            retained.truncate(self.config.max_articles);
        }

        info!(input = articles.len(), output = retained.len(), "🔥 Heat filter applied");
        retained
    }

    fn retain_at(&self, articles: &[Article], threshold: f64) -> Vec<Article> {
        articles
            .iter()
            .filter(|a| a.heat_or_zero() >= threshold)
            .cloned()
            .collect()
    }
}

impl Default for HeatFilter {
    fn default() -> Self {
        Self::new(HeatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scored(scores: &[Option<f64>]) -> Vec<Article> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let mut a = Article::new(&format!("https://example.com/{}", i), format!("Article {}", i), Utc::now(), "Test").unwrap();
                a.set_heat_score(*score);
                a
            })
            .collect()
    }

    fn scores(articles: &[Article]) -> Vec<f64> {
        articles.iter().map(Article::heat_or_zero).collect()
    }

    #[test]
    fn test_relaxes_from_pre_threshold_set() {
        let filter = HeatFilter::default();
        let input = scored(&[Some(10.0), Some(25.0), Some(35.0), Some(50.0), Some(90.0)]);
        assert_eq!(scores(&filter.apply(&input)), vec![25.0, 35.0, 50.0, 90.0]);
    }

    #[test]
    fn test_primary_threshold_when_enough_survive() {
        let filter = HeatFilter::new(HeatConfig {
            min_viable: 2,
            ..Default::default()
        });
        let input = scored(&[Some(10.0), Some(25.0), Some(35.0), None, Some(90.0)]);
        assert_eq!(scores(&filter.apply(&input)), vec![35.0, 90.0]);
    }

    #[test]
    fn test_cap_sorts_descending() {
        let filter = HeatFilter::new(HeatConfig {
            max_articles: 3,
            min_viable: 1,
            ..Default::default()
        });
        let input = scored(&[Some(40.0), Some(95.0), Some(60.0), Some(60.0), Some(31.0)]);
        let output = filter.apply(&input);
        assert_eq!(scores(&output), vec![95.0, 60.0, 60.0]);
        assert_eq!(output[1].title, "Article 2");
        assert_eq!(output[2].title, "Article 3");
    }

    #[test]
    fn test_idempotent_below_cap() {
        let filter = HeatFilter::default();
        let input = scored(&[Some(22.0), Some(80.0), Some(45.0), Some(5.0), None]);
        let once = filter.apply(&input);
        let twice = filter.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(HeatFilter::default().apply(&[]).is_empty());
    }
}
