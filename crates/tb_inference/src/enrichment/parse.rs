use serde_json::{Map, Value};
use tb_core::types::DEFAULT_ENTITY_CATEGORY;
use tb_core::{Article, Entities};

/// Key points kept per article.
pub const MAX_KEY_POINTS: usize = 3;

/// Enrichment fields after coercion. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentPayload {
    pub summary_localized: Option<String>,
    pub plain_summary: Option<String>,
    pub key_points: Vec<String>,
    pub entities: Entities,
    pub tags: Vec<String>,
    pub trend_tag: Option<String>,
    pub heat_score: Option<f64>,
}

impl EnrichmentPayload {
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in string_list(object.get("tags")) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Self {
            summary_localized: non_blank(object.get("summary_localized")),
            plain_summary: non_blank(object.get("plain_summary")),
            key_points: string_list(object.get("key_points")).into_iter().take(MAX_KEY_POINTS).collect(),
            entities: entities(object.get("entities")),
            tags,
            trend_tag: non_blank(object.get("trend_tag")),
            heat_score: heat(object.get("heat_score")),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Writes the present fields onto the article. Absent fields leave it untouched.
    pub fn apply(self, article: &mut Article) {
        if self.summary_localized.is_some() {
            article.summary_localized = self.summary_localized;
        }
        if self.plain_summary.is_some() {
            article.plain_summary = self.plain_summary;
        }
        if !self.key_points.is_empty() {
            article.key_points = self.key_points;
        }
        if !self.entities.is_empty() {
            article.entities = self.entities;
        }
        if !self.tags.is_empty() {
            article.tags = self.tags;
        }
        if self.trend_tag.is_some() {
            article.trend_tag = self.trend_tag;
        }
        if self.heat_score.is_some() {
            article.set_heat_score(self.heat_score);
        }
    }
}

/// Removes a surrounding markdown code fence.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Parses a model reply. Falls back to the outermost `{...}` span, then to an empty payload.
pub fn parse_response(raw: &str) -> EnrichmentPayload {
    let stripped = strip_code_blocks(raw);
    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        return EnrichmentPayload::from_value(&value);
    }

    let span = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => return EnrichmentPayload::default(),
    };
    serde_json::from_str::<Value>(span)
        .map(|value| EnrichmentPayload::from_value(&value))
        .unwrap_or_default()
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| non_blank(Some(v))).collect(),
        _ => Vec::new(),
    }
}

fn heat(value: Option<&Value>) -> Option<f64> {
    let score = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.filter(|s| s.is_finite())
}

fn entities(value: Option<&Value>) -> Entities {
    match value {
        Some(Value::Object(map)) => categorized(map),
        Some(Value::Array(_)) => {
            let names = string_list(value);
            let mut entities = Entities::new();
            if !names.is_empty() {
                entities.insert(DEFAULT_ENTITY_CATEGORY.to_string(), names);
            }
            entities
        }
        _ => Entities::new(),
    }
}

fn categorized(map: &Map<String, Value>) -> Entities {
    let mut entities = Entities::new();
    for (category, names) in map {
        let category = category.trim();
        if category.is_empty() {
            continue;
        }
        let names = match names {
            Value::String(_) => non_blank(Some(names)).into_iter().collect(),
            Value::Array(_) => string_list(Some(names)),
            _ => Vec::new(),
        };
        if !names.is_empty() {
            entities.entry(category.to_string()).or_insert_with(Vec::new).extend(names);
        }
    }
    entities
}
