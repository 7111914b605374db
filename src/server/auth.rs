//! Request identity
//!
//! Full authentication (password hashing, JWT verification, email codes)
//! happens at the deployment edge. The core only needs a stable user id to
//! scope ownership; in local mode every request maps to the configured
//! local account unless an explicit identity header is present.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::AppState;
use crate::error::Error;

const USER_HEADER: &str = "x-user-id";

/// The authenticated user id for a request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
        {
            return Ok(AuthUser {
                user_id: user_id.trim().to_string(),
            });
        }

        match state.settings.auth.auth_provider.as_str() {
            "local" | "none" => Ok(AuthUser {
                user_id: state.settings.auth.local_auth_email.clone(),
            }),
            _ => Err(Error::Unauthorized("Missing user identity".into())),
        }
    }
}
