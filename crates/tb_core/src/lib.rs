pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use models::EnrichmentModel;
pub use storage::{ArticleSink, ArticleStatus, ArticleStorage, UpsertOutcome};
pub use types::{Article, Entities};
