//! File metadata shared between sandbox and storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file known to a session.
///
/// Two-space ownership: the sandbox addresses files by `file_path`, the
/// storage by `file_id`. A session record holds both keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileInfo {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl FileInfo {
    /// Placeholder record carrying only a sandbox path, to be resolved by the
    /// task runner's storage sync.
    pub fn from_path(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Default::default()
        }
    }
}
