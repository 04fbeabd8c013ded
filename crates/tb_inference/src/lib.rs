pub mod dedup;
pub mod enrichment;
pub mod heat;
pub mod models;

/// Credentials and endpoint for the enrichment model.
#[derive(Debug, Clone, Default)]
pub struct InferenceConfig {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
}

pub mod prelude {
    pub use super::dedup::{DedupStrategy, Deduplicate, Deduplicator, EventClusterer, TitleOverlapFilter};
    pub use super::enrichment::EnrichmentBatcher;
    pub use super::heat::HeatFilter;
    pub use super::models::{create_model, ModelKind};
    pub use super::InferenceConfig;
    pub use tb_core::{Article, Error, Result};
}

pub use models::create_model;
