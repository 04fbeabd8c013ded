pub mod cli;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod scrapers;
pub mod sink;

pub use cli::{handle_command, ScraperArgs, ScraperCommands};
pub use logging::{init_logging, StageLogger};
pub use manager::{CollectionReport, ScraperManager};
pub use pipeline::{Pipeline, PipelineReport};
pub use scrapers::{default_scrapers, Scraper};
pub use sink::{JsonDigestSink, LogSink};

pub mod prelude {
    pub use super::scrapers::{Scraper, SourceKind, SourceMetadata};
    pub use super::{Pipeline, ScraperManager};
    pub use tb_core::{Article, Error, Result};
}
