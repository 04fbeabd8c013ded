use std::collections::HashSet;

use tb_core::config::DedupConfig;
use tb_core::Article;

use super::text::content_words;
use super::Deduplicate;

/// Linear near-duplicate filter on shared title words. Earlier articles win.
#[derive(Debug, Clone)]
pub struct TitleOverlapFilter {
    min_overlap: usize,
    max_length_delta: usize,
}

impl TitleOverlapFilter {
    pub fn new(min_overlap: usize, max_length_delta: usize) -> Self {
        Self {
            min_overlap: min_overlap.max(1),
            max_length_delta,
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.min_overlap, config.max_title_length_delta)
    }

    fn is_duplicate(&self, candidate: &(HashSet<String>, usize), accepted: &(HashSet<String>, usize)) -> bool {
        let overlap = candidate.0.intersection(&accepted.0).count();
        overlap >= self.min_overlap && candidate.1.abs_diff(accepted.1) < self.max_length_delta
    }
}

impl Default for TitleOverlapFilter {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl Deduplicate for TitleOverlapFilter {
    fn name(&self) -> &str {
        "title-overlap"
    }

    fn deduplicate(&self, articles: Vec<Article>) -> Vec<Article> {
        let mut accepted_keys: Vec<(HashSet<String>, usize)> = Vec::new();
        let mut accepted = Vec::new();
        for article in articles {
            let key = (content_words(&article.title), article.title.chars().count());
            if accepted_keys.iter().any(|seen| self.is_duplicate(&key, seen)) {
                tracing::debug!(title = %article.title, "dropping near-duplicate title");
                continue;
            }
            accepted_keys.push(key);
            accepted.push(article);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str) -> Article {
        let slug: String = title.chars().filter(|c| c.is_alphanumeric()).collect();
        Article::new(&format!("https://news.example.com/{}", slug), title, Utc::now(), "Test").unwrap()
    }

    #[test]
    fn test_drops_later_overlapping_titles() {
        let filter = TitleOverlapFilter::default();
        let output = filter.deduplicate(vec![
            article("Google DeepMind unveils Gemini Ultra"),
            article("Gemini Ultra from Google DeepMind is here"),
            article("Microsoft ships Copilot update"),
        ]);
        let titles: Vec<&str> = output.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Google DeepMind unveils Gemini Ultra", "Microsoft ships Copilot update"]);
    }

    #[test]
    fn test_three_shared_words_drop_two_keep() {
        let filter = TitleOverlapFilter::new(3, 50);

        let output = filter.deduplicate(vec![
            article("Nvidia Blackwell chips"),
            article("Blackwell chips from Nvidia delayed"),
        ]);
        assert_eq!(output.len(), 1);

        let output = filter.deduplicate(vec![
            article("Nvidia Blackwell chips"),
            article("Blackwell chips delayed again"),
        ]);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_length_delta_boundary() {
        let filter = TitleOverlapFilter::new(3, 50);
        let base = "Nvidia Blackwell chips";
        let padded = |delta: usize| format!("{} {}", base, "z".repeat(delta - 1));
        assert_eq!(padded(49).chars().count() - base.chars().count(), 49);
        assert_eq!(padded(50).chars().count() - base.chars().count(), 50);

        assert_eq!(filter.deduplicate(vec![article(base), article(&padded(49))]).len(), 1);
        assert_eq!(filter.deduplicate(vec![article(base), article(&padded(50))]).len(), 2);
    }

    #[test]
    fn test_stop_words_do_not_count() {
        let filter = TitleOverlapFilter::default();
        let output = filter.deduplicate(vec![
            article("The state of the art in AI"),
            article("The rise of the robots in the factory"),
        ]);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_large_length_difference_keeps_both() {
        let filter = TitleOverlapFilter::new(3, 50);
        let short = article("OpenAI GPT model pricing");
        let long = article(
            "OpenAI GPT model pricing explained in full detail with every tier, region and discount option listed",
        );
        assert!(long.title.chars().count() - short.title.chars().count() >= 50);
        assert_eq!(filter.deduplicate(vec![short, long]).len(), 2);
    }

    #[test]
    fn test_empty_titles_never_match() {
        let filter = TitleOverlapFilter::new(3, 50);
        assert_eq!(filter.deduplicate(vec![article(""), article("")]).len(), 2);
    }
}
