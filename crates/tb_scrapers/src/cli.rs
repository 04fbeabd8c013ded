use clap::{Args, Subcommand};
use tb_core::Result;

use crate::pipeline::Pipeline;

#[derive(Args, Debug, Clone)]
pub struct ScraperArgs {
    #[command(subcommand)]
    pub command: ScraperCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScraperCommands {
    /// Collect, enrich, deduplicate, rank, deliver and persist
    Run {
        /// Only use these sources (e.g. arxiv, rss, serper). Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Collect articles and print them without enriching or storing
    Collect {
        /// Only use these sources (e.g. arxiv, rss, serper). Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// List available scrapers
    List,
}

impl ScraperCommands {
    pub fn sources(&self) -> &[String] {
        match self {
            ScraperCommands::Run { sources } | ScraperCommands::Collect { sources } => sources.as_slice(),
            ScraperCommands::List => &[],
        }
    }
}

pub async fn handle_command(command: &ScraperCommands, pipeline: &mut Pipeline, days_ago: u32) -> Result<()> {
    pipeline.manager_mut().retain_sources(command.sources())?;

    match command {
        ScraperCommands::Run { .. } => {
            let report = pipeline.run(days_ago).await?;
            println!(
                "Collected {} articles from {} sources, delivering {}",
                report.collected,
                report.collection.succeeded(),
                report.delivered_count()
            );
            for (i, article) in report.delivered.iter().enumerate() {
                println!("{:>3}. [{:>5.1}] {} - {}", i + 1, article.heat_or_zero(), article.title, article.link());
            }
            println!(
                "🆕 {} new, 📝 {} updated, ⏭️ {} unchanged, ❌ {} rejected",
                report.persisted.inserted, report.persisted.updated, report.persisted.unchanged, report.persisted.rejected
            );
        }
        ScraperCommands::Collect { .. } => {
            let report = pipeline.manager().collect_all(days_ago).await;
            println!("Found {} articles", report.articles.len());
            for article in &report.articles {
                println!("[{}] {} - {}", article.source, article.title, article.link());
            }
            for (source, error) in &report.failures {
                eprintln!("Failed to collect from {}: {}", source, error);
            }
        }
        ScraperCommands::List => {
            println!("Available scrapers:");
            print!("{}", pipeline.manager().list_scrapers());
        }
    }
    Ok(())
}
