use crate::constants::{auth::TOKEN_EXPIRY_MARGIN_MS, hosts::TOKEN_PATH, limits::ERROR_TEXT_BYTES};
use crate::errors::ToolError;
use crate::services::config::DropboxConfig;
use crate::services::logger::Logger;
use crate::utils::redact::{redact_secret, redact_text};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Hands out the bearer token for user and team routes.
///
/// A static `DROPBOX_ACCESS_TOKEN` is used as-is. With a refresh token configured, short-lived
/// tokens are minted at `/oauth2/token` and cached until shortly before they expire; the lock
/// is held across the exchange so concurrent calls share one refresh.
pub struct TokenProvider {
    config: Arc<DropboxConfig>,
    http: Client,
    logger: Logger,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(config: Arc<DropboxConfig>, http: Client, logger: Logger) -> Self {
        let seeded = config.access_token.clone().map(|token| CachedToken {
            token,
            expires_at: None,
        });
        Self {
            config,
            http,
            logger: logger.child("auth"),
            cache: Mutex::new(seeded),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.config.refresh.is_some()
    }

    pub async fn bearer(&self) -> Result<String, ToolError> {
        let mut guard = self.cache.lock().await;
        if let Some(cached) = guard.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }
        if self.config.refresh.is_none() {
            return self
                .config
                .access_token
                .clone()
                .ok_or_else(missing_token_error);
        }
        let fresh = self.refresh().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    /// Forgets the current token so the next `bearer()` mints a new one.
    pub async fn invalidate(&self) {
        if self.can_refresh() {
            *self.cache.lock().await = None;
        }
    }

    /// App key and secret for routes authenticated as the app itself.
    pub fn app_credentials(&self) -> Result<(String, Option<String>), ToolError> {
        let key = self.config.app_key.clone().ok_or_else(|| {
            ToolError::denied("This route needs app authentication but DROPBOX_APP_KEY is not set")
                .with_code("MISSING_APP_KEY")
                .with_hint("Set DROPBOX_APP_KEY and DROPBOX_APP_SECRET")
        })?;
        Ok((key, self.config.app_secret.clone()))
    }

    async fn refresh(&self) -> Result<CachedToken, ToolError> {
        let Some(credentials) = self.config.refresh.as_ref() else {
            return Err(missing_token_error());
        };
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", credentials.app_key.as_str()),
        ];
        if let Some(secret) = credentials.app_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let body = serde_urlencoded::to_string(&form)
            .map_err(|err| ToolError::internal(format!("Failed to encode token request: {}", err)))?;

        let url = self
            .config
            .api_url
            .join(TOKEN_PATH.trim_start_matches('/'))
            .map_err(|err| ToolError::internal(format!("Invalid token URL: {}", err)))?;
        self.logger.debug(
            "refreshing access token",
            Some(&serde_json::json!({ "app_key": redact_secret(&credentials.app_key) })),
        );

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ToolError::timeout("Token refresh timed out")
                } else {
                    ToolError::retryable(format!("Token refresh failed: {}", err))
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            self.logger.warn(
                "token refresh rejected",
                Some(&serde_json::json!({"status": status.as_u16()})),
            );
            return Err(ToolError::denied(format!(
                "Dropbox rejected the refresh token ({})",
                status.as_u16()
            ))
            .with_code("REFRESH_FAILED")
            .with_hint("Re-authorize the app and update DROPBOX_REFRESH_TOKEN")
            .with_details(serde_json::json!({
                "status": status.as_u16(),
                "error": parsed.get("error").cloned().unwrap_or(Value::Null),
                "body": redact_text(&text, ERROR_TEXT_BYTES),
            })));
        }

        let payload: TokenResponse = serde_json::from_str(&text)
            .map_err(|_| ToolError::internal("Token endpoint returned an unexpected body"))?;
        let expires_at = payload.expires_in.and_then(|secs| {
            let ttl_ms = secs.saturating_mul(1000);
            (ttl_ms > TOKEN_EXPIRY_MARGIN_MS)
                .then(|| Instant::now() + Duration::from_millis(ttl_ms - TOKEN_EXPIRY_MARGIN_MS))
        });
        // A token that expires inside the margin is still usable once.
        let expires_at = expires_at.or_else(|| payload.expires_in.map(|_| Instant::now()));
        Ok(CachedToken {
            token: payload.access_token,
            expires_at,
        })
    }
}

fn missing_token_error() -> ToolError {
    ToolError::denied("No Dropbox credentials configured")
        .with_code("MISSING_TOKEN")
        .with_hint("Set DROPBOX_ACCESS_TOKEN, or DROPBOX_REFRESH_TOKEN with DROPBOX_APP_KEY")
}
