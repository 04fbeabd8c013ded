use std::fmt;

use async_trait::async_trait;

use crate::Result;

/// A text-generation backend used to enrich articles.
#[async_trait]
pub trait EnrichmentModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Sends a prompt and returns the raw completion text. Implementations are
    /// asked for a JSON object but callers must not assume they get one.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
