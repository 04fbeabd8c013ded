use std::fmt;

use serde_json::json;
use tb_core::{EnrichmentModel, Result};

use crate::enrichment::ARTICLE_MARKER;

const ENTITY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Google", &["google", "alphabet", "deepmind", "gemini"]),
    ("OpenAI", &["openai", "gpt", "chatgpt"]),
    ("NVIDIA", &["nvidia", "cuda"]),
    ("Microsoft", &["microsoft", "azure"]),
    ("Meta", &["meta ", "facebook", "llama"]),
    ("Anthropic", &["anthropic", "claude"]),
    ("Hugging Face", &["hugging face", "huggingface"]),
    ("PyTorch", &["pytorch"]),
    ("TensorFlow", &["tensorflow"]),
    ("LLM", &["llm", "large language model", "language model"]),
    ("Transformer", &["transformer", "attention"]),
];

const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("capability", &["capability", "ability", "performance", "benchmark", "accuracy", "state-of-the-art"]),
    ("cost", &["price", "cost", "rate limit", "pricing", "cheaper", "efficient"]),
    ("paradigm", &["paradigm", "framework", "architecture", "method", "approach"]),
    ("landscape", &["company", "partnership", "ecosystem", "market", "funding", "acquisition"]),
];

/// Deterministic keyword model for offline runs. Never calls the network.
pub struct DummyModel;

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").finish()
    }
}

impl DummyModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyModel {
    fn default() -> Self {
        Self::new()
    }
}

fn first_sentences(text: &str, count: usize) -> Vec<String> {
    text.split(|c| c == '.' || c == '!' || c == '?' || c == '\n')
        .map(|s| s.trim())
        .filter(|s| s.split_whitespace().count() >= 3)
        .take(count)
        .map(|s| format!("{}.", s))
        .collect()
}

#[async_trait::async_trait]
impl EnrichmentModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let article_text = prompt
            .rsplit_once(ARTICLE_MARKER)
            .map(|(_, rest)| rest)
            .unwrap_or(prompt);
        let lower = article_text.to_lowercase();

        let entities: Vec<&str> = ENTITY_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(entity, _)| *entity)
            .take(10)
            .collect();

        let mut tags: Vec<&str> = TAG_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(tag, _)| *tag)
            .collect();
        if tags.is_empty() && (lower.contains(" ai ") || lower.contains("machine learning")) {
            tags.push("capability");
        }

        let body = article_text.lines().skip(1).collect::<Vec<_>>().join("\n");
        let sentences = first_sentences(&body, 3);
        let heat = 15.0 + 12.0 * entities.len() as f64 + 8.0 * tags.len() as f64;

        let response = json!({
            "summary_localized": sentences.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            "plain_summary": sentences.first().cloned().unwrap_or_default(),
            "key_points": sentences,
            "entities": entities,
            "tags": tags,
            "trend_tag": tags.first(),
            "heat_score": heat,
        });
        Ok(response.to_string())
    }
}
