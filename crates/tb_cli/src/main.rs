use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tb_core::config::{load_feeds, ClusterLinkage, PipelineConfig};
use tb_core::{ArticleSink, ArticleStorage, EnrichmentModel, Result};
use tb_inference::models::{create_model, ModelKind};
use tb_inference::InferenceConfig;
use tb_scrapers::{
    default_scrapers, handle_command, init_logging, JsonDigestSink, LogSink, Pipeline, Scraper, ScraperArgs,
    ScraperCommands, ScraperManager,
};
use tb_storage::{create_storage, StorageKind, StorageOptions};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    /// Accepts `90`, `30s`, `15m`, `1h`, `1d` and combinations such as `1h15m30s`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_value = false;

        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let num: u64 = current_number
                .parse()
                .map_err(|_| format!("Missing number before unit '{}'", c))?;
            let multiplier = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total_seconds += num * multiplier;
            current_number.clear();
            has_value = true;
        }

        // a trailing bare number counts as seconds
        if !current_number.is_empty() {
            total_seconds += current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            has_value = true;
        }

        if !has_value {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Duration must be positive".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Collects, enriches and ranks AI news", long_about = None)]
struct Cli {
    /// Storage backend: memory, file, sqlite, supabase
    #[arg(long, env = "TB_STORAGE", default_value = "memory")]
    storage: StorageKind,
    /// Database or JSON file for the file and sqlite backends
    #[arg(long)]
    storage_path: Option<PathBuf>,
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_service_role_key: Option<String>,
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_anon_key: Option<String>,
    #[arg(long, env = "SUPABASE_TABLE_ARTICLES", default_value = "articles")]
    supabase_table: String,

    /// Enrichment model: openrouter or dummy
    #[arg(long, env = "TB_MODEL", default_value = "openrouter")]
    model: ModelKind,
    #[arg(long, env = "OPENROUTER_MODEL")]
    model_name: Option<String>,
    #[arg(long, env = "OPENROUTER_BASE_URL")]
    model_url: Option<String>,
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_api_key: Option<String>,

    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    serper_api_key: Option<String>,
    /// Serper news query. Repeatable.
    #[arg(long = "serper-query")]
    serper_queries: Vec<String>,

    /// JSON array of {"name", "url"} feeds replacing the built-in list
    #[arg(long)]
    feeds: Option<PathBuf>,
    /// Skip fetching full article pages for feed entries
    #[arg(long)]
    no_full_content: bool,

    #[arg(long, env = "DAYS_AGO", default_value_t = 1)]
    days_ago: u32,
    #[arg(long, env = "SIMILARITY_THRESHOLD", default_value_t = 0.6)]
    similarity_threshold: f64,
    /// Cluster chains of similar articles together instead of matching against the first one
    #[arg(long)]
    transitive: bool,
    #[arg(long, env = "NLP_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,
    #[arg(long, env = "MAX_ARTICLES_PER_FEED", default_value_t = 100)]
    max_articles_per_feed: usize,
    #[arg(long, env = "ARXIV_MAX_RESULTS_PER_CATEGORY", default_value_t = 20)]
    arxiv_max_results: usize,

    /// Write the ranked digest as JSON into this directory instead of logging it
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Repeat `run` with this interval (e.g. 1h, 30m, 1d, 1h15m30s)
    #[arg(long)]
    interval: Option<HumanDuration>,
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    args: ScraperArgs,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::default();
        config.days_ago = self.days_ago;
        config.dedup.similarity_threshold = self.similarity_threshold;
        if self.transitive {
            config.dedup.linkage = ClusterLinkage::Transitive;
        }
        config.enrichment.batch_size = self.batch_size;
        config.rss.max_entries_per_feed = self.max_articles_per_feed;
        config.rss.fetch_full_content = !self.no_full_content;
        config.arxiv.max_results_per_category = self.arxiv_max_results;
        if let Some(path) = &self.feeds {
            config.rss.feeds = load_feeds(path)?;
        }
        config.serper.api_key = self.serper_api_key.clone().filter(|k| !k.trim().is_empty());
        config.serper.queries = self.serper_queries.clone();
        config.validate()?;
        Ok(config)
    }

    /// Service role key first, then the generic key, then the anon key.
    fn supabase_api_key(&self) -> Option<String> {
        [&self.supabase_service_role_key, &self.supabase_key, &self.supabase_anon_key]
            .into_iter()
            .flatten()
            .find(|k| !k.trim().is_empty())
            .cloned()
    }

    fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            path: self.storage_path.clone(),
            url: self.supabase_url.clone(),
            api_key: self.supabase_api_key(),
            table: Some(self.supabase_table.clone()),
        }
    }

    fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            api_key: self.openrouter_api_key.clone(),
            model_name: self.model_name.clone(),
            base_url: self.model_url.clone(),
        }
    }

    /// Only `run` talks to the model and the store.
    fn runs(&self) -> bool {
        matches!(self.args.command, ScraperCommands::Run { .. })
    }

    fn build_model(&self) -> Result<Arc<dyn EnrichmentModel>> {
        let kind = if self.runs() { self.model } else { ModelKind::Dummy };
        create_model(kind, &self.inference_config())
    }

    /// Storage kind and settings, checked without connecting.
    fn storage_plan(&self) -> Result<(StorageKind, StorageOptions)> {
        if !self.runs() {
            return Ok((StorageKind::Memory, StorageOptions::default()));
        }
        let options = self.storage_options();
        options.validate(self.storage)?;
        Ok((self.storage, options))
    }
}

async fn check_storage_with_retry(storage: &Arc<dyn ArticleStorage>, max_retries: u32, timeout: Duration) -> Result<usize> {
    let mut last_error = None;
    for attempt in 1..=max_retries {
        match tokio::time::timeout(timeout, storage.count()).await {
            Ok(Ok(count)) => return Ok(count),
            Ok(Err(e)) => last_error = Some(e),
            Err(_) => {
                last_error = Some(tb_core::Error::Storage(format!(
                    "Storage health check timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
        if attempt < max_retries {
            warn!("Storage health check failed, retrying {}/{}...", attempt, max_retries);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
    Err(last_error.unwrap_or_else(|| tb_core::Error::Storage("Storage health check failed after all retries".to_string())))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // everything that can be checked offline fails before any I/O
    let config = cli.pipeline_config().context("invalid configuration")?;
    let model = cli.build_model().context("invalid model configuration")?;
    let (storage_kind, storage_options) = cli.storage_plan().context("invalid storage configuration")?;
    let command = cli.args.command.clone();
    let runs = cli.runs();

    let storage = create_storage(storage_kind, &storage_options).await?;
    if runs {
        let count = check_storage_with_retry(&storage, 3, Duration::from_secs(10)).await?;
        info!("💾 Storage initialized ({:?}, {} articles stored)", storage_kind, count);
    }
    info!("🧠 Enrichment model initialized (using {})", model.name());

    let manager = ScraperManager::with_scrapers(default_scrapers(&config), config.source_timeout);
    let names: Vec<&str> = manager.scrapers().iter().map(|s| s.source_metadata().name).collect();
    info!("🦗 Scrapers initialized: {}", names.join(", "));

    let sink: Arc<dyn ArticleSink> = match &cli.output_dir {
        Some(dir) => Arc::new(JsonDigestSink::new(dir)),
        None => Arc::new(LogSink),
    };
    let mut pipeline = Pipeline::new(&config, manager, model, storage, sink);

    match cli.interval {
        Some(interval) if runs => {
            info!("Running in periodic mode with {}s interval", interval.0.as_secs());
            loop {
                info!("Starting pipeline cycle");
                if let Err(e) = handle_command(&command, &mut pipeline, config.days_ago).await {
                    error!("Pipeline cycle failed: {}", e);
                }
                info!("Waiting {}s before next cycle", interval.0.as_secs());
                tokio::time::sleep(interval.0).await;
            }
        }
        _ => handle_command(&command, &mut pipeline, config.days_ago).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        let parse = |s: &str| s.parse::<HumanDuration>().map(|d| d.0.as_secs());
        assert_eq!(parse("90"), Ok(90));
        assert_eq!(parse("30s"), Ok(30));
        assert_eq!(parse("15m"), Ok(900));
        assert_eq!(parse("1h15m30s"), Ok(4530));
        assert_eq!(parse("1d"), Ok(86400));
        assert_eq!(parse("1h 30m"), Ok(5400));
        assert!(parse("").is_err());
        assert!(parse("h").is_err());
        assert!(parse("5x").is_err());
        assert!(parse("0s").is_err());
    }

    #[test]
    fn test_supabase_key_priority() {
        let cli = Cli::parse_from([
            "tb",
            "--supabase-key",
            "generic",
            "--supabase-anon-key",
            "anon",
            "list",
        ]);
        assert_eq!(cli.supabase_api_key().as_deref(), Some("generic"));

        let cli = Cli::parse_from([
            "tb",
            "--supabase-service-role-key",
            "service",
            "--supabase-key",
            "generic",
            "list",
        ]);
        assert_eq!(cli.supabase_api_key().as_deref(), Some("service"));
    }

    #[test]
    fn test_pipeline_config_from_flags() {
        let cli = Cli::parse_from([
            "tb",
            "--days-ago",
            "3",
            "--similarity-threshold",
            "0.5",
            "--transitive",
            "--batch-size",
            "4",
            "run",
        ]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.days_ago, 3);
        assert_eq!(config.dedup.similarity_threshold, 0.5);
        assert_eq!(config.dedup.linkage, ClusterLinkage::Transitive);
        assert_eq!(config.enrichment.batch_size, 4);
    }

    #[test]
    fn test_missing_model_key_fails_before_storage() {
        let cli = Cli::parse_from([
            "tb",
            "--model",
            "openrouter",
            "--openrouter-api-key",
            "",
            "--storage",
            "supabase",
            "--supabase-url",
            "https://project.supabase.co",
            "--supabase-key",
            "service",
            "run",
        ]);
        assert!(cli.pipeline_config().is_ok());
        assert!(cli.storage_plan().is_ok());
        assert!(matches!(cli.build_model(), Err(tb_core::Error::Config(_))));
    }

    #[test]
    fn test_storage_plan() {
        let cli = Cli::parse_from(["tb", "--storage", "supabase", "run"]);
        assert!(matches!(cli.storage_plan(), Err(tb_core::Error::Config(_))));

        // listing never touches the configured store or model
        let cli = Cli::parse_from(["tb", "--storage", "supabase", "--model", "openrouter", "list"]);
        let (kind, _) = cli.storage_plan().unwrap();
        assert_eq!(kind, StorageKind::Memory);
        assert_eq!(cli.build_model().unwrap().name(), "Dummy");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cli = Cli::parse_from(["tb", "--batch-size", "0", "run"]);
        assert!(matches!(cli.pipeline_config(), Err(tb_core::Error::Config(_))));

        let cli = Cli::parse_from(["tb", "--similarity-threshold", "1.5", "run"]);
        assert!(cli.pipeline_config().is_err());
    }
}
