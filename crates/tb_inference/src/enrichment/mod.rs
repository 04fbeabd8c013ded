//! Batched enrichment of collected articles.
//!
//! Articles are sent to the model in fixed-size batches. Batches run one
//! after another; the articles inside a batch run concurrently. A failing
//! or slow call only costs that article its enrichment.

use std::sync::Arc;

use futures_util::future::join_all;
use tb_core::config::EnrichmentConfig;
use tb_core::{Article, EnrichmentModel};
use tracing::{debug, info, warn};

pub mod parse;

pub use parse::{parse_response, EnrichmentPayload};

/// Separates the instructions from the article in a prompt.
pub const ARTICLE_MARKER: &str = "\n---\nTitle: ";

const INSTRUCTIONS: &str = r#"Analyse the AI news article below and reply with one JSON object using these keys:
- "summary_localized": a two or three sentence summary
- "plain_summary": one sentence a non-specialist can follow
- "key_points": up to three short key points
- "entities": object mapping a category (ORG, PERSON, PRODUCT, TECH) to a list of names
- "tags": any of "capability", "cost", "paradigm", "landscape"
- "trend_tag": the single most relevant tag
- "heat_score": number from 0 to 100 rating how significant the news is
Leave out any key you cannot fill."#;

pub struct EnrichmentBatcher {
    model: Arc<dyn EnrichmentModel>,
    config: EnrichmentConfig,
}

impl EnrichmentBatcher {
    pub fn new(model: Arc<dyn EnrichmentModel>, config: EnrichmentConfig) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn build_prompt(&self, article: &Article) -> String {
        let body = parse::truncate_chars(article.body(), self.config.content_char_limit);
        format!("{}{}{}\nContent: {}", INSTRUCTIONS, ARTICLE_MARKER, article.title, body)
    }

    /// Enriches every article. The output has the input's length and order.
    pub async fn enrich_all(&self, articles: Vec<Article>) -> Vec<Article> {
        let total = articles.len();
        let batch_size = self.config.batch_size.max(1);
        info!(total, batch_size, model = self.model.name(), "🧠 Enriching articles");

        let mut enriched = Vec::with_capacity(total);
        let mut remaining = articles.into_iter().peekable();
        let mut batch_number = 0;
        while remaining.peek().is_some() {
            let batch: Vec<Article> = remaining.by_ref().take(batch_size).collect();
            batch_number += 1;
            debug!(batch = batch_number, size = batch.len(), "enrichment batch started");
            let results = join_all(batch.into_iter().map(|article| self.enrich_article(article))).await;
            enriched.extend(results);
        }

        let succeeded = enriched.iter().filter(|a| a.is_enriched()).count();
        info!(total, succeeded, "✅ Enrichment finished");
        enriched
    }

    /// Enriches one article. Any failure leaves the article without enrichment.
    pub async fn enrich_article(&self, mut article: Article) -> Article {
        let prompt = self.build_prompt(&article);
        match tokio::time::timeout(self.config.request_timeout, self.model.complete(&prompt)).await {
            Ok(Ok(raw)) => {
                let payload = parse_response(&raw);
                if payload.is_empty() {
                    warn!(link = article.link(), "model reply carried no usable fields");
                }
                payload.apply(&mut article);
            }
            Ok(Err(e)) => warn!(link = article.link(), error = %e, "enrichment failed"),
            Err(_) => warn!(
                link = article.link(),
                timeout_secs = self.config.request_timeout.as_secs_f64(),
                "enrichment timed out"
            ),
        }
        article
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tb_core::{Error, Result};

    use crate::models::DummyModel;

    #[derive(Default)]
    struct MockModel {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl fmt::Debug for MockModel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MockModel").finish()
        }
    }

    #[async_trait]
    impl EnrichmentModel for MockModel {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if prompt.contains("Title: fail") {
                return Err(Error::Inference("boom".to_string()));
            }
            if prompt.contains("Title: slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if prompt.contains("Title: garbage") {
                return Ok("no json here".to_string());
            }
            Ok(r#"```json
{"heat_score": 55, "tags": ["capability"], "trend_tag": "capability"}
```"#
                .to_string())
        }
    }

    fn article(title: &str) -> Article {
        Article::new(&format!("https://example.com/{}", title.replace(' ', "-")), title, Utc::now(), "Test")
            .unwrap()
            .with_summary("A summary about a model release.")
    }

    fn config(batch_size: usize) -> EnrichmentConfig {
        EnrichmentConfig {
            batch_size,
            request_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let model = Arc::new(MockModel::default());
        let batcher = EnrichmentBatcher::new(model.clone(), config(10));
        let input = vec![article("ok one"), article("fail now"), article("garbage reply"), article("ok two")];

        let output = batcher.enrich_all(input).await;

        assert_eq!(output.len(), 4);
        let titles: Vec<&str> = output.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["ok one", "fail now", "garbage reply", "ok two"]);
        assert_eq!(output[0].heat_score(), Some(55.0));
        assert!(!output[1].is_enriched());
        assert!(!output[2].is_enriched());
        assert_eq!(output[3].trend_tag.as_deref(), Some("capability"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_yields_default_enrichment() {
        let batcher = EnrichmentBatcher::new(Arc::new(MockModel::default()), config(4));
        let output = batcher.enrich_all(vec![article("slow call"), article("fast call")]).await;
        assert!(!output[0].is_enriched());
        assert!(output[1].is_enriched());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_batch_size() {
        let model = Arc::new(MockModel::default());
        let batcher = EnrichmentBatcher::new(model.clone(), config(3));
        let input: Vec<Article> = (0..8).map(|i| article(&format!("item {}", i))).collect();

        let output = batcher.enrich_all(input).await;

        assert_eq!(output.len(), 8);
        assert!(model.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let batcher = EnrichmentBatcher::new(Arc::new(MockModel::default()), config(10));
        assert!(batcher.enrich_all(Vec::new()).await.is_empty());
    }

    #[test]
    fn test_prompt_truncates_body() {
        let batcher = EnrichmentBatcher::new(
            Arc::new(DummyModel::new()),
            EnrichmentConfig {
                content_char_limit: 10,
                ..Default::default()
            },
        );
        let a = article("Short").with_content("0123456789ABCDEF");
        let prompt = batcher.build_prompt(&a);
        assert!(prompt.ends_with("Title: Short\nContent: 0123456789"));
    }

    #[tokio::test]
    async fn test_dummy_model_end_to_end() {
        let batcher = EnrichmentBatcher::new(Arc::new(DummyModel::new()), config(2));
        let a = article("NVIDIA unveils new GPU").with_content(
            "NVIDIA announced a chip with record benchmark performance. The price is lower than before.",
        );
        let output = batcher.enrich_all(vec![a]).await;
        assert_eq!(output[0].entities["MISC"], vec!["NVIDIA"]);
        assert!(output[0].heat_score().unwrap() >= 30.0);
    }
}
