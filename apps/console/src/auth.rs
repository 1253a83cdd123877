/// Admin guard backed by the remote identity service.
///
/// A request passes only if its bearer token resolves, via
/// `GET {auth}/api/auth/me`, to a user with `is_admin == true`. Anything else
/// (non-200, bad JSON, network failure) counts as unauthorized.
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, warn};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    is_admin: bool,
}

#[derive(Clone)]
pub struct AdminAuth {
    client: Client,
    me_url: String,
}

impl AdminAuth {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            me_url: format!("{}/api/auth/me", base_url.trim_end_matches('/')),
        }
    }

    /// True when the identity service vouches for `token` as an admin.
    pub async fn check_permissions(&self, token: &str) -> bool {
        let response = self
            .client
            .get(&self.me_url)
            .header("accept", "application/json")
            .bearer_auth(token)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("Error checking permissions: {e}");
                return false;
            }
        };

        if response.status().as_u16() != 200 {
            warn!("Permission check failed: {}", response.status());
            return false;
        }

        match response.json::<MeResponse>().await {
            Ok(me) => me.is_admin,
            Err(e) => {
                error!("Error checking permissions: {e}");
                false
            }
        }
    }
}

/// Extracts `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
}

/// Middleware guarding every `/api` route.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or_else(|| {
        AppError::Unauthorized("Authorization header missing or invalid".to_string())
    })?;

    if !state.auth.check_permissions(token).await {
        return Err(AppError::Unauthorized(
            "Invalid token or insufficient permissions".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
