//! User model
//!
//! Authentication flows (password hashing, JWT minting, email verification)
//! live at the edge; the core only needs identity and ownership scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(fullname: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::short_id(),
            fullname: fullname.into(),
            email: email.into(),
            password_hash: None,
            role: UserRole::User,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }
}
