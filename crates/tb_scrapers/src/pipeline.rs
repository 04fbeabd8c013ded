use std::sync::Arc;

use serde::Serialize;
use tb_core::config::PipelineConfig;
use tb_core::{Article, ArticleSink, ArticleStorage, EnrichmentModel, Result, UpsertOutcome};
use tb_inference::dedup::{DedupStrategy, Deduplicate, Deduplicator};
use tb_inference::enrichment::EnrichmentBatcher;
use tb_inference::heat::HeatFilter;
use tb_storage::dedupe_by_link;

use crate::logging::StageLogger;
use crate::manager::{CollectionReport, ScraperManager};

/// Article counts after each stage of one cycle.
#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    pub collection: CollectionReport,
    pub collected: usize,
    pub after_clustering: usize,
    pub enriched: usize,
    pub after_overlap: usize,
    pub persisted: UpsertOutcome,
    #[serde(skip)]
    pub delivered: Vec<Article>,
}

impl PipelineReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

/// One ingestion cycle: collect, deduplicate, enrich, filter, deliver, persist.
pub struct Pipeline {
    manager: ScraperManager,
    event_dedup: Deduplicator,
    batcher: EnrichmentBatcher,
    overlap_dedup: Deduplicator,
    heat: HeatFilter,
    sink: Arc<dyn ArticleSink>,
    storage: Arc<dyn ArticleStorage>,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        manager: ScraperManager,
        model: Arc<dyn EnrichmentModel>,
        storage: Arc<dyn ArticleStorage>,
        sink: Arc<dyn ArticleSink>,
    ) -> Self {
        Self {
            manager,
            event_dedup: Deduplicator::new(DedupStrategy::Clustering, &config.dedup),
            batcher: EnrichmentBatcher::new(model, config.enrichment.clone()),
            overlap_dedup: Deduplicator::new(DedupStrategy::TitleOverlap, &config.dedup),
            heat: HeatFilter::new(config.heat.clone()),
            sink,
            storage,
        }
    }

    pub fn manager(&self) -> &ScraperManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ScraperManager {
        &mut self.manager
    }

    /// Runs one cycle. Collection and enrichment failures only shrink the
    /// output. A persistence failure is returned after delivery was attempted.
    pub async fn run(&self, days_ago: u32) -> Result<PipelineReport> {
        let log = StageLogger::new().with_prefix(format!("{}d", days_ago));
        let mut report = PipelineReport::default();

        let mut collection = self.manager.collect_all(days_ago).await;
        let articles = std::mem::take(&mut collection.articles);
        report.collection = collection;
        report.collected = articles.len();
        if articles.is_empty() {
            log.warn("no articles collected, ending cycle early");
            return Ok(report);
        }

        let articles = self.event_dedup.deduplicate(articles);
        report.after_clustering = articles.len();

        let articles = self.batcher.enrich_all(articles).await;
        report.enriched = articles.iter().filter(|a| a.is_enriched()).count();

        let articles = self.overlap_dedup.deduplicate(articles);
        report.after_overlap = articles.len();

        report.delivered = self.heat.apply(&articles);

        let delivery = self.sink.deliver(&report.delivered).await;
        if let Err(e) = &delivery {
            log.clone()
                .with_prefix(self.sink.name())
                .error(&format!("delivery failed: {}", e));
        }

        let unique = dedupe_by_link(&articles);
        let persist_log = log.clone().with_prefix("persist");
        match self.storage.upsert_articles(&unique).await {
            Ok(outcome) => {
                persist_log.info(&format!(
                    "💾 {} inserted, {} updated, {} unchanged, {} rejected",
                    outcome.inserted, outcome.updated, outcome.unchanged, outcome.rejected
                ));
                report.persisted = outcome;
            }
            Err(e) => {
                persist_log.error(&format!("persistence failed: {}", e));
                return Err(e);
            }
        }
        delivery?;

        log.info(&format!(
            "✅ {} collected, {} after clustering, {} enriched, {} after overlap, {} delivered",
            report.collected,
            report.after_clustering,
            report.enriched,
            report.after_overlap,
            report.delivered_count()
        ));
        Ok(report)
    }
}
