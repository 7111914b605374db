//! Application configuration loaded from the environment
//!
//! All options are read once at startup; `.env` files are honored via dotenv
//! in the binary. Unknown variables are ignored.

use std::env;

use crate::error::{Error, Result};

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// LLM provider configuration
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_base: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Sandbox supervisor configuration
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub address: Option<String>,
    pub image: Option<String>,
    pub name_prefix: Option<String>,
    pub ttl_minutes: u32,
    pub network: Option<String>,
    pub chrome_args: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

/// Web search provider configuration
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub provider: String,
    pub google_search_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
}

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl RedisSettings {
    /// Connection URL in the form redis://[:password@]host:port/db
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Local-auth and token configuration.
///
/// Password hashing and JWT minting live outside this crate; the fields are
/// recognized so one `.env` drives the whole deployment.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub auth_provider: String,
    pub password_salt: Option<String>,
    pub password_hash_rounds: u32,
    pub local_auth_email: String,
    pub local_auth_password: String,
    pub local_auth_accounts: Option<String>,
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
    pub jwt_access_token_expire_minutes: u32,
    pub jwt_refresh_token_expire_days: u32,
}

/// SMTP configuration (verification mail is sent by the auth edge)
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,
    pub sqlite_path: String,
    pub file_storage_path: String,
    pub redis: RedisSettings,
    pub sandbox: SandboxSettings,
    pub search: SearchSettings,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    pub mcp_config_path: String,
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            llm: LlmSettings {
                api_key: var("API_KEY").unwrap_or_default(),
                api_base: var_or("API_BASE", "https://open.bigmodel.cn/api/coding/paas/v4"),
                model_name: var_or("MODEL_NAME", "glm-4.7"),
                temperature: var_parse("TEMPERATURE", 0.7),
                max_tokens: var_parse("MAX_TOKENS", 4096),
            },
            sqlite_path: var_or("SQLITE_PATH", "data/opspilot.db"),
            file_storage_path: var_or("FILE_STORAGE_PATH", "data/files"),
            redis: RedisSettings {
                host: var_or("REDIS_HOST", "127.0.0.1"),
                port: var_parse("REDIS_PORT", 6379),
                db: var_parse("REDIS_DB", 0),
                password: var("REDIS_PASSWORD"),
            },
            sandbox: SandboxSettings {
                address: var("SANDBOX_ADDRESS"),
                image: var("SANDBOX_IMAGE"),
                name_prefix: var("SANDBOX_NAME_PREFIX"),
                ttl_minutes: var_parse("SANDBOX_TTL_MINUTES", 30),
                network: var("SANDBOX_NETWORK"),
                chrome_args: var("SANDBOX_CHROME_ARGS"),
                http_proxy: var("SANDBOX_HTTP_PROXY"),
                https_proxy: var("SANDBOX_HTTPS_PROXY"),
                no_proxy: var("SANDBOX_NO_PROXY"),
            },
            search: SearchSettings {
                provider: var_or("SEARCH_PROVIDER", "bing"),
                google_search_api_key: var("GOOGLE_SEARCH_API_KEY"),
                google_search_engine_id: var("GOOGLE_SEARCH_ENGINE_ID"),
            },
            auth: AuthSettings {
                auth_provider: var_or("AUTH_PROVIDER", "local"),
                password_salt: var("PASSWORD_SALT"),
                password_hash_rounds: var_parse("PASSWORD_HASH_ROUNDS", 10),
                local_auth_email: var_or("LOCAL_AUTH_EMAIL", "admin"),
                local_auth_password: var_or("LOCAL_AUTH_PASSWORD", "admin123"),
                local_auth_accounts: var("LOCAL_AUTH_ACCOUNTS"),
                jwt_secret_key: var_or("JWT_SECRET_KEY", "change-me-in-production"),
                jwt_algorithm: var_or("JWT_ALGORITHM", "HS256"),
                jwt_access_token_expire_minutes: var_parse("JWT_ACCESS_TOKEN_EXPIRE_MINUTES", 30),
                jwt_refresh_token_expire_days: var_parse("JWT_REFRESH_TOKEN_EXPIRE_DAYS", 7),
            },
            email: EmailSettings {
                host: var("EMAIL_HOST"),
                port: var("EMAIL_PORT").and_then(|v| v.parse().ok()),
                username: var("EMAIL_USERNAME"),
                password: var("EMAIL_PASSWORD"),
                from: var("EMAIL_FROM"),
            },
            mcp_config_path: var_or("MCP_CONFIG_PATH", "/etc/mcp.json"),
            host: var_or("HOST", "0.0.0.0"),
            port: var_parse("PORT", 8000),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.llm.api_key.is_empty() {
            return Err(Error::Configuration("API key is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url() {
        let plain = RedisSettings {
            host: "localhost".into(),
            port: 6379,
            db: 0,
            password: None,
        };
        assert_eq!(plain.url(), "redis://localhost:6379/0");

        let secured = RedisSettings {
            password: Some("s3cret".into()),
            ..plain
        };
        assert_eq!(secured.url(), "redis://:s3cret@localhost:6379/0");
    }
}
