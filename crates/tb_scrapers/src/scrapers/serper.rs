use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tb_core::config::SerperConfig;
use tb_core::{Article, Error, Result};
use tracing::{info, warn};

use super::utils;
use super::{Scraper, SourceKind, SourceMetadata};

const SEARCH_URL: &str = "https://google.serper.dev/search";
const DEFAULT_SOURCE: &str = "Serper News";

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
    tbm: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    pub snippet: Option<String>,
    pub date: Option<String>,
    pub source: Option<String>,
}

/// News results from the Serper search API, one request per configured query.
pub struct SerperScraper {
    api_key: String,
    config: SerperConfig,
    search_url: String,
}

impl std::fmt::Debug for SerperScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperScraper")
            .field("api_key", &"<redacted>")
            .field("queries", &self.config.queries)
            .finish()
    }
}

impl SerperScraper {
    /// `None` when no key or no queries are configured.
    pub fn from_config(config: &SerperConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        if config.queries.is_empty() {
            return None;
        }
        Some(Self {
            api_key,
            config: config.clone(),
            search_url: SEARCH_URL.to_string(),
        })
    }

    pub fn with_search_url(mut self, search_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self
    }

    async fn search(&self, client: &reqwest::Client, query: &str) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            q: query,
            num: self.config.num_results,
            tbm: "nws",
        };
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            let sent = client
                .post(&self.search_url)
                .header("X-API-KEY", &self.api_key)
                .json(&request)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    let body: SearchResponse = response.json().await?;
                    return Ok(body.organic);
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable(status) || attempt == max_attempts {
                        return Err(Error::Scraping(format!("Serper search for '{}' failed with status {}", query, status)));
                    }
                    warn!(query, %status, attempt, "Serper request failed, retrying");
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_attempts => {
                    warn!(query, error = %e, attempt, "Serper request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
        Err(Error::Scraping(format!("Serper search for '{}' exhausted retries", query)))
    }
}

/// Rate limits and server errors are retried. Other client errors are final.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// 1s, 2s, 4s, ... for attempts 1, 2, 3, ...
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

/// Parses "3 hours ago" style or "May 1, 2024" style dates.
pub fn parse_result_date(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if let [amount, unit, "ago"] = parts.as_slice() {
        let amount: i64 = amount.parse().ok()?;
        let unit = unit.trim_end_matches('s');
        let offset = match unit {
            "second" | "sec" => chrono::Duration::seconds(amount),
            "minute" | "min" => chrono::Duration::minutes(amount),
            "hour" => chrono::Duration::hours(amount),
            "day" => chrono::Duration::days(amount),
            "week" => chrono::Duration::weeks(amount),
            "month" => chrono::Duration::days(30 * amount),
            _ => return None,
        };
        return Some(now - offset);
    }

    ["%b %d, %Y", "%B %d, %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d))
}

/// Maps search results to articles. Undated results count as published at `now`.
pub fn map_results(results: Vec<SearchResult>, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Article> {
    results
        .into_iter()
        .filter_map(|result| {
            let published = result
                .date
                .as_deref()
                .and_then(|d| parse_result_date(d, now))
                .unwrap_or(now);
            if published < cutoff {
                return None;
            }
            let source = result.source.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
            match Article::new(&result.link, result.title.trim(), published, source) {
                Ok(article) => Some(article.with_summary(result.snippet.unwrap_or_default())),
                Err(e) => {
                    warn!(link = %result.link, error = %e, "skipping search result with invalid link");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl Scraper for SerperScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "Serper",
            emoji: "🔎",
            kind: SourceKind::Search,
        }
    }

    fn cli_names(&self) -> Vec<&str> {
        vec!["serper", "news"]
    }

    async fn collect(&self, days_ago: u32) -> Result<Vec<Article>> {
        let client = utils::http_client(Duration::from_secs(10))?;
        let cutoff = utils::cutoff(days_ago);

        let mut articles = Vec::new();
        let mut failures = 0;
        for query in &self.config.queries {
            match self.search(&client, query).await {
                Ok(results) => {
                    let mapped = map_results(results, cutoff, Utc::now());
                    info!(query = %query, articles = mapped.len(), "🔎 Search results collected");
                    articles.extend(mapped);
                }
                Err(e) => {
                    failures += 1;
                    warn!(query = %query, error = %e, "search query failed, continuing");
                }
            }
        }

        if failures > 0 && failures == self.config.queries.len() {
            return Err(Error::Scraping(format!("all {} search queries failed", failures)));
        }
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_requires_key_and_queries() {
        assert!(SerperScraper::from_config(&SerperConfig::default()).is_none());

        let config = SerperConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(SerperScraper::from_config(&config).is_none());

        let config = SerperConfig {
            api_key: Some("key".to_string()),
            queries: vec!["AI".to_string()],
            ..Default::default()
        };
        let scraper = SerperScraper::from_config(&config).unwrap();
        assert!(!format!("{:?}", scraper).contains("key\""));
    }

    #[test]
    fn test_retry_policy() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        for code in [400u16, 401, 403, 404, 405] {
            assert!(!is_retryable(StatusCode::from_u16(code).unwrap()));
        }
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_parse_result_date() {
        assert_eq!(parse_result_date("3 hours ago", now()), Some(now() - chrono::Duration::hours(3)));
        assert_eq!(parse_result_date("1 day ago", now()), Some(now() - chrono::Duration::days(1)));
        assert_eq!(
            parse_result_date("Apr 28, 2024", now()),
            Some(Utc.with_ymd_and_hms(2024, 4, 28, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_result_date("sometime", now()), None);
    }

    #[test]
    fn test_map_results() {
        let body = r#"{"organic": [
            {"title": "OpenAI ships an update", "link": "https://news.example.com/a", "snippet": "Details.", "date": "2 hours ago", "source": "Example News"},
            {"title": "Old story", "link": "https://news.example.com/b", "date": "Jan 15, 2020"},
            {"title": "Undated story", "link": "news.example.com/c"},
            {"title": "Broken", "link": ""}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let cutoff = now() - chrono::Duration::days(1);
        let articles = map_results(response.organic, cutoff, now());

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source, "Example News");
        assert_eq!(articles[0].summary.as_deref(), Some("Details."));
        assert_eq!(articles[1].source, DEFAULT_SOURCE);
        assert_eq!(articles[1].link(), "https://news.example.com/c");
        assert_eq!(articles[1].published, now());
    }

    #[tokio::test]
    async fn test_collect_fails_when_every_query_fails() {
        let config = SerperConfig {
            api_key: Some("key".to_string()),
            queries: vec!["AI".to_string(), "LLM".to_string()],
            max_retries: 1,
            ..Default::default()
        };
        let scraper = SerperScraper::from_config(&config)
            .unwrap()
            .with_search_url("http://127.0.0.1:9/search");
        assert!(matches!(scraper.collect(1).await, Err(Error::Scraping(_))));
    }
}
