//! Error types for the agent backend

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for the backend
#[derive(Debug, Error)]
pub enum Error {
    /// Request validation, quota, or state-machine violations
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing/invalid credentials or signature
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Entity not found (ownership mismatches present as not found)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Field-level constraint violations
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Downstream LLM failures
    #[error("LLM error: {0}")]
    Llm(String),

    /// Sandbox environment failures
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Event stream transport failures
    #[error("Stream error: {0}")]
    Stream(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQL errors
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Generic server-side errors
    #[error("{0}")]
    Server(String),
}

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({
            "code": status.as_u16(),
            "msg": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::NotFound("session".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::BadRequest("quota".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Server("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
