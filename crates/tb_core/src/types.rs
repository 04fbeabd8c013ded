use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Error, Result};

/// Upper bound for the heat score scale.
pub const MAX_HEAT_SCORE: f64 = 100.0;

/// Length cap applied to the raw summary when it is used as a short description.
pub const SHORT_DESCRIPTION_CHARS: usize = 280;

/// Entity category used when a model returns a flat list of entity names.
pub const DEFAULT_ENTITY_CATEGORY: &str = "MISC";

pub type Entities = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    link: String,
    pub title: String,
    pub published: DateTime<Utc>,
    pub source: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,

    pub summary_localized: Option<String>,
    pub plain_summary: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub tags: Vec<String>,
    pub trend_tag: Option<String>,
    heat_score: Option<f64>,

    #[serde(default)]
    pub is_favorite: bool,
}

impl Article {
    /// Builds an article from collector output. The id is derived from the link.
    pub fn new(
        link: &str,
        title: impl Into<String>,
        published: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Result<Self> {
        let link = normalize_link(link)?;
        Ok(Self {
            id: link_id(&link),
            link,
            title: title.into(),
            published,
            source: source.into(),
            summary: None,
            content: None,
            authors: Vec::new(),
            categories: Vec::new(),
            summary_localized: None,
            plain_summary: None,
            key_points: Vec::new(),
            entities: Entities::new(),
            tags: Vec::new(),
            trend_tag: None,
            heat_score: None,
            is_favorite: false,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.id = id;
        }
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = non_blank(summary.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = non_blank(content.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn heat_score(&self) -> Option<f64> {
        self.heat_score
    }

    /// Heat score used for ranking, absent scores count as zero.
    pub fn heat_or_zero(&self) -> f64 {
        self.heat_score.unwrap_or(0.0)
    }

    /// Stores a heat score clamped into `[0, 100]`. Non-finite values clear it.
    pub fn set_heat_score(&mut self, score: Option<f64>) {
        self.heat_score = score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, MAX_HEAT_SCORE));
    }

    /// Text used to enrich the article: full content when present, else the summary.
    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or("")
    }

    /// The raw summary, whitespace-collapsed and capped, when it carries any text.
    pub fn short_description(&self) -> Option<String> {
        let summary = self.summary.as_deref()?;
        let collapsed = collapse_whitespace(summary);
        if collapsed.is_empty() {
            return None;
        }
        Some(collapsed.chars().take(SHORT_DESCRIPTION_CHARS).collect())
    }

    pub fn is_enriched(&self) -> bool {
        self.summary_localized.is_some()
            || self.plain_summary.is_some()
            || self.trend_tag.is_some()
            || self.heat_score.is_some()
            || !self.key_points.is_empty()
            || !self.entities.is_empty()
            || !self.tags.is_empty()
    }
}

/// Lowercase hex SHA-256 of the link.
pub fn link_id(link: &str) -> String {
    let digest = Sha256::digest(link.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Prepends `https://` to scheme-less links and checks the result is an http(s) URL.
pub fn normalize_link(link: &str) -> Result<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty link".to_string()));
    }
    let candidate = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = Url::parse(&candidate).map_err(|e| Error::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    if parsed.host_str().map_or(true, |h| !h.contains('.') && h != "localhost") {
        return Err(Error::InvalidUrl(trimmed.to_string()));
    }
    Ok(candidate)
}

fn has_http_scheme(link: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| link.get(..scheme.len()).map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme)))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
