//! Web search tool and providers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{optional_str, require_str, Tool, ToolFunction, ToolResult};
use crate::config::SearchSettings;
use crate::error::{Error, Result};
use crate::models::{SearchResultItem, SearchResults};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RESULTS: usize = 10;

/// Pluggable search backend
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str, date_range: Option<&str>) -> Result<SearchResults>;
}

/// Build the configured provider; `None` disables the search tool entirely.
pub fn build_search_engine(settings: &SearchSettings) -> Option<Arc<dyn SearchEngine>> {
    let client = reqwest::Client::builder()
        .timeout(SEARCH_TIMEOUT)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
        .build()
        .ok()?;

    match settings.provider.as_str() {
        "google" => {
            let api_key = settings.google_search_api_key.clone()?;
            let engine_id = settings.google_search_engine_id.clone()?;
            Some(Arc::new(GoogleSearchEngine {
                client,
                api_key,
                engine_id,
            }))
        }
        "bing" => Some(Arc::new(HtmlSearchEngine {
            client,
            provider: HtmlProvider::Bing,
        })),
        "baidu" => Some(Arc::new(HtmlSearchEngine {
            client,
            provider: HtmlProvider::Baidu,
        })),
        other => {
            tracing::warn!(provider = other, "Unknown search provider, search disabled");
            None
        }
    }
}

/// Google Custom Search JSON API
pub struct GoogleSearchEngine {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
}

#[async_trait]
impl SearchEngine for GoogleSearchEngine {
    async fn search(&self, query: &str, date_range: Option<&str>) -> Result<SearchResults> {
        let mut request = self
            .client
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", "10"),
            ]);
        if let Some(range) = date_range.and_then(google_date_restrict) {
            request = request.query(&[("dateRestrict", range)]);
        }

        let payload: Value = request
            .send()
            .await
            .map_err(|e| Error::Server(format!("google search failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Server(format!("google search rejected: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Server(format!("google search invalid: {e}")))?;

        let results = payload
            .get("items")
            .and_then(|items| items.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SearchResultItem {
                            title: item.get("title")?.as_str()?.to_string(),
                            url: item.get("link")?.as_str()?.to_string(),
                            snippet: item
                                .get("snippet")
                                .and_then(|s| s.as_str())
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .take(MAX_RESULTS)
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResults {
            query: query.to_string(),
            results,
        })
    }
}

fn google_date_restrict(range: &str) -> Option<&'static str> {
    match range {
        "past_day" | "day" => Some("d1"),
        "past_week" | "week" => Some("w1"),
        "past_month" | "month" => Some("m1"),
        "past_year" | "year" => Some("y1"),
        _ => None,
    }
}

enum HtmlProvider {
    Bing,
    Baidu,
}

lazy_static! {
    // Result anchors on both engines carry an absolute http(s) href followed
    // by the hit title inside the same <a> tag.
    static ref ANCHOR_PATTERN: Regex =
        Regex::new(r#"<a[^>]+href="(https?://[^"]+)"[^>]*>(.*?)</a>"#).expect("anchor pattern");
    static ref TAG_PATTERN: Regex = Regex::new(r"<[^>]+>").expect("tag pattern");
}

/// Keyless fallback scraping the public result page
struct HtmlSearchEngine {
    client: reqwest::Client,
    provider: HtmlProvider,
}

impl HtmlSearchEngine {
    fn result_url(&self, query: &str) -> String {
        let encoded = urlencoding::encode(query);
        match self.provider {
            HtmlProvider::Bing => format!("https://www.bing.com/search?q={encoded}"),
            HtmlProvider::Baidu => format!("https://www.baidu.com/s?wd={encoded}"),
        }
    }

    fn host_filter(&self, url: &str) -> bool {
        // Skip the engine's own navigation links
        let own = match self.provider {
            HtmlProvider::Bing => ["bing.com", "microsoft.com"].as_slice(),
            HtmlProvider::Baidu => ["baidu.com"].as_slice(),
        };
        !own.iter().any(|host| url.contains(host))
    }
}

pub(crate) fn extract_anchors(html: &str) -> Vec<(String, String)> {
    ANCHOR_PATTERN
        .captures_iter(html)
        .filter_map(|caps| {
            let url = caps.get(1)?.as_str().to_string();
            let title = TAG_PATTERN
                .replace_all(caps.get(2)?.as_str(), "")
                .trim()
                .to_string();
            if title.is_empty() {
                return None;
            }
            Some((url, title))
        })
        .collect()
}

#[async_trait]
impl SearchEngine for HtmlSearchEngine {
    async fn search(&self, query: &str, _date_range: Option<&str>) -> Result<SearchResults> {
        let html = self
            .client
            .get(self.result_url(query))
            .send()
            .await
            .map_err(|e| Error::Server(format!("search fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Server(format!("search body unreadable: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        let results = extract_anchors(&html)
            .into_iter()
            .filter(|(url, _)| self.host_filter(url))
            .filter(|(url, _)| seen.insert(url.clone()))
            .take(MAX_RESULTS)
            .map(|(url, title)| SearchResultItem {
                title,
                url,
                snippet: String::new(),
            })
            .collect();

        Ok(SearchResults {
            query: query.to_string(),
            results,
        })
    }
}

/// Executor-facing search tool
pub struct SearchTool {
    engine: Arc<dyn SearchEngine>,
}

impl SearchTool {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![ToolFunction::new(
            "info_search_web",
            "Search the web for fresh information and candidate links.",
            serde_json::json!({
                "query": {"type": "string", "description": "Search query"},
                "date_range": {
                    "type": "string",
                    "enum": ["past_day", "past_week", "past_month", "past_year"],
                    "description": "Optional freshness filter"
                },
            }),
            &["query"],
        )]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        if function_name != "info_search_web" {
            return ToolResult::fail(format!("Unknown search function: {function_name}"));
        }
        let query = match require_str(args, "query") {
            Ok(query) => query,
            Err(failure) => return failure,
        };
        match self
            .engine
            .search(query, optional_str(args, "date_range"))
            .await
        {
            Ok(results) => match serde_json::to_value(&results) {
                Ok(data) => ToolResult::ok(data),
                Err(err) => ToolResult::fail(format!("Search result serialization failed: {err}")),
            },
            Err(err) => ToolResult::fail(format!("Search failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_anchors_strips_markup() {
        let html = r#"
            <li><a href="https://example.com/a" target="_blank"><b>First</b> hit</a></li>
            <li><a href="/relative">ignored</a></li>
            <li><a href="https://example.com/b">Second</a></li>
        "#;
        let anchors = extract_anchors(html);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0], ("https://example.com/a".to_string(), "First hit".to_string()));
    }

    #[test]
    fn test_google_date_restrict() {
        assert_eq!(google_date_restrict("past_week"), Some("w1"));
        assert_eq!(google_date_restrict("bogus"), None);
    }
}
