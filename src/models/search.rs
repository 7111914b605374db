//! Web search result types

use serde::{Deserialize, Serialize};

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Result set returned by a search provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchResultItem>,
}
