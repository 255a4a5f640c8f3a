use crate::constants::{headers, hosts::API_VERSION_PREFIX, network, retry};
use crate::dropbox::endpoint::{AuthMode, Endpoint, Style};
use crate::dropbox::header_arg::header_safe_json;
use crate::dropbox::response::{
    error_from_response, map_reqwest_error, normalize_body, parse_retry_after,
};
use crate::errors::ToolError;
use crate::services::config::DropboxConfig;
use crate::services::logger::Logger;
use crate::services::token_provider::TokenProvider;
use base64::Engine;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Per-call header overrides. Unset fields fall back to the config defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub select_user: Option<String>,
    pub select_admin: Option<String>,
    pub path_root: Option<Value>,
    pub timeout_ms: Option<u64>,
}

/// A downloaded file: metadata from `Dropbox-API-Result` plus the (possibly capped) body.
#[derive(Debug, Clone)]
pub struct Download {
    pub metadata: Value,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub content_type: Option<String>,
}

enum Payload {
    Json(Value),
    Upload { arg: Value, bytes: Vec<u8> },
    Download { arg: Value },
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    truncated: bool,
}

#[derive(Clone)]
pub struct DropboxClient {
    logger: Logger,
    config: Arc<DropboxConfig>,
    http: Client,
    tokens: Arc<TokenProvider>,
}

impl DropboxClient {
    pub fn new(config: Arc<DropboxConfig>, logger: Logger) -> Result<Self, ToolError> {
        let http = Client::builder()
            .user_agent(network::USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        let tokens = Arc::new(TokenProvider::new(config.clone(), http.clone(), logger.clone()));
        Ok(Self {
            logger: logger.child("client"),
            config,
            http,
            tokens,
        })
    }

    pub fn config(&self) -> &DropboxConfig {
        &self.config
    }

    /// RPC call: JSON argument in, JSON result out. `Value::Null` sends a literal `null` body,
    /// which is what argument-less routes expect.
    pub async fn rpc(
        &self,
        endpoint: &Endpoint,
        arg: &Value,
        options: &CallOptions,
    ) -> Result<Value, ToolError> {
        let raw = self
            .send_with_retry(endpoint, Payload::Json(arg.clone()), options)
            .await?;
        Ok(normalize_body(content_type(&raw.headers), &raw.body))
    }

    /// Upload call: argument in `Dropbox-API-Arg`, file bytes as the body.
    pub async fn upload(
        &self,
        endpoint: &Endpoint,
        arg: &Value,
        bytes: Vec<u8>,
        options: &CallOptions,
    ) -> Result<Value, ToolError> {
        let raw = self
            .send_with_retry(
                endpoint,
                Payload::Upload {
                    arg: arg.clone(),
                    bytes,
                },
                options,
            )
            .await?;
        Ok(normalize_body(content_type(&raw.headers), &raw.body))
    }

    /// Download call: metadata from `Dropbox-API-Result`, body captured up to `max_bytes`.
    pub async fn download(
        &self,
        endpoint: &Endpoint,
        arg: &Value,
        options: &CallOptions,
        max_bytes: Option<usize>,
    ) -> Result<Download, ToolError> {
        let cap = max_bytes
            .unwrap_or(self.config.max_download_bytes)
            .min(self.config.max_download_bytes);
        let raw = self
            .send_with_retry_capped(endpoint, Payload::Download { arg: arg.clone() }, options, cap)
            .await?;
        let metadata = raw
            .headers
            .get(headers::API_RESULT)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_str::<Value>(v).ok())
            .unwrap_or(Value::Null);
        Ok(Download {
            metadata,
            content_type: content_type(&raw.headers).map(str::to_string),
            truncated: raw.truncated,
            bytes: raw.body,
        })
    }

    async fn send_with_retry(
        &self,
        endpoint: &Endpoint,
        payload: Payload,
        options: &CallOptions,
    ) -> Result<RawResponse, ToolError> {
        self.send_with_retry_capped(endpoint, payload, options, usize::MAX)
            .await
    }

    async fn send_with_retry_capped(
        &self,
        endpoint: &Endpoint,
        payload: Payload,
        options: &CallOptions,
        cap: usize,
    ) -> Result<RawResponse, ToolError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        let mut refreshed = false;

        loop {
            attempt += 1;
            let started = Instant::now();
            let raw = self.send_once(endpoint, &payload, options, cap).await?;
            let status = raw.status.as_u16();
            self.logger.debug(
                &endpoint.route,
                Some(&serde_json::json!({
                    "status": status,
                    "attempt": attempt,
                    "duration_ms": started.elapsed().as_millis() as u64,
                })),
            );

            if raw.status.is_success() {
                return Ok(raw);
            }

            let retry_after_ms = parse_retry_after(
                raw.headers
                    .get(headers::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let err = error_from_response(
                &endpoint.route,
                status,
                content_type(&raw.headers),
                &raw.body,
                retry_after_ms,
            );

            if err.code == "EXPIRED_ACCESS_TOKEN"
                && !refreshed
                && matches!(endpoint.auth, AuthMode::User | AuthMode::Team)
                && self.tokens.can_refresh()
            {
                refreshed = true;
                self.logger.info("access token expired, refreshing", None);
                self.tokens.invalidate().await;
                continue;
            }

            if retry::STATUS_CODES.contains(&status) && attempt < max_attempts {
                let delay = compute_retry_delay(attempt, retry_after_ms);
                self.logger.warn(
                    "Dropbox asked to back off",
                    Some(&serde_json::json!({
                        "route": endpoint.route,
                        "status": status,
                        "attempt": attempt,
                        "delay_ms": delay,
                    })),
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }

            return Err(err);
        }
    }

    async fn send_once(
        &self,
        endpoint: &Endpoint,
        payload: &Payload,
        options: &CallOptions,
        cap: usize,
    ) -> Result<RawResponse, ToolError> {
        if let (Style::Upload, Payload::Json(_)) | (Style::Download, Payload::Json(_)) =
            (endpoint.style, payload)
        {
            return Err(ToolError::internal(format!(
                "{} is a content route and cannot be called as RPC",
                endpoint.route
            )));
        }
        let url = self.endpoint_url(endpoint)?;
        let mut request_headers = self.build_headers(endpoint, options).await?;

        let body: Vec<u8> = match payload {
            Payload::Json(arg) => {
                request_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                serde_json::to_vec(arg)?
            }
            Payload::Upload { arg, bytes } => {
                request_headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                request_headers.insert(headers::API_ARG, header_value(&header_safe_json(arg))?);
                bytes.clone()
            }
            Payload::Download { arg } => {
                request_headers.insert(headers::API_ARG, header_value(&header_safe_json(arg))?);
                Vec::new()
            }
        };

        let timeout_ms = options
            .timeout_ms
            .or(endpoint.timeout_ms)
            .unwrap_or(self.config.timeout_ms);
        let response = self
            .http
            .post(url)
            .headers(request_headers)
            .body(body)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|err| map_reqwest_error(&endpoint.route, err))?;

        let status = response.status();
        let response_headers = response.headers().clone();
        // Error bodies are always read whole; they are small and needed for the summary.
        let cap = if status.is_success() { cap } else { usize::MAX };
        let (body, truncated) = read_capped(&endpoint.route, response, cap).await?;
        Ok(RawResponse {
            status,
            headers: response_headers,
            body,
            truncated,
        })
    }

    fn endpoint_url(&self, endpoint: &Endpoint) -> Result<Url, ToolError> {
        let base = self.config.host_url(endpoint.host);
        let path = format!("{}{}", API_VERSION_PREFIX, endpoint.route);
        base.join(path.trim_start_matches('/')).map_err(|err| {
            ToolError::internal(format!("Invalid URL for {}: {}", endpoint.route, err))
        })
    }

    async fn build_headers(
        &self,
        endpoint: &Endpoint,
        options: &CallOptions,
    ) -> Result<HeaderMap, ToolError> {
        let mut out = HeaderMap::new();
        match endpoint.auth {
            AuthMode::User | AuthMode::Team => {
                let token = self.tokens.bearer().await?;
                out.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
            }
            AuthMode::App => {
                let (key, secret) = self.tokens.app_credentials()?;
                let raw = format!("{}:{}", key, secret.unwrap_or_default());
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                out.insert(AUTHORIZATION, header_value(&format!("Basic {}", encoded))?);
            }
            AuthMode::None => {}
        }

        if endpoint.auth == AuthMode::User {
            let select_user = options
                .select_user
                .as_ref()
                .or(self.config.select_user.as_ref());
            let select_admin = options
                .select_admin
                .as_ref()
                .or(self.config.select_admin.as_ref());
            if let Some(member) = select_user {
                out.insert(headers::SELECT_USER, header_value(member)?);
            } else if let Some(admin) = select_admin {
                out.insert(headers::SELECT_ADMIN, header_value(admin)?);
            }
            if let Some(root) = options.path_root.as_ref() {
                out.insert(
                    headers::PATH_ROOT,
                    header_value(&header_safe_json(&normalize_path_root(root)))?,
                );
            }
        }
        Ok(out)
    }
}

/// `path_root` may be given as a bare namespace id, which means "rooted at that namespace".
fn normalize_path_root(root: &Value) -> Value {
    match root {
        Value::String(id) if id == "home" => serde_json::json!({".tag": "home"}),
        Value::String(id) => serde_json::json!({".tag": "root", "root": id}),
        other => other.clone(),
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, ToolError> {
    HeaderValue::from_str(raw)
        .map_err(|_| ToolError::invalid_params("Header value contains characters HTTP cannot carry"))
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Reads the body until `cap` bytes; the rest of the stream is dropped unread.
async fn read_capped(
    route: &str,
    response: reqwest::Response,
    cap: usize,
) -> Result<(Vec<u8>, bool), ToolError> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| map_reqwest_error(route, err))?;
        let room = cap.saturating_sub(buffer.len());
        if chunk.len() > room {
            buffer.extend_from_slice(&chunk[..room]);
            return Ok((buffer, true));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok((buffer, false))
}

/// Exponential backoff with jitter; a server-provided `Retry-After` wins when it is longer.
pub(crate) fn compute_retry_delay(attempt: usize, retry_after_ms: Option<u64>) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16) as i32;
    let mut delay = (retry::BASE_DELAY_MS as f64) * 2f64.powi(exponent);
    delay = delay.min(retry::MAX_DELAY_MS as f64);
    if retry::JITTER > 0.0 {
        let delta = delay * retry::JITTER;
        delay = delay - delta + rand::random::<f64>() * delta * 2.0;
    }
    let delay = delay.max(0.0) as u64;
    match retry_after_ms {
        Some(server) if server > delay => server,
        _ => delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_respects_retry_after() {
        let first = compute_retry_delay(1, None);
        assert!(first >= 400 && first <= 600, "first delay {}", first);
        let capped = compute_retry_delay(30, None);
        assert!(capped <= (retry::MAX_DELAY_MS as f64 * 1.2) as u64);
        assert_eq!(compute_retry_delay(1, Some(10_000)), 10_000);
    }

    #[test]
    fn retry_after_header_lengthens_the_wait() {
        let retry_after = crate::dropbox::response::parse_retry_after(Some("2"));
        assert_eq!(retry_after, Some(2_000));
        assert_eq!(compute_retry_delay(1, retry_after), 2_000);
        // A shorter server hint never cuts the computed backoff.
        let third = compute_retry_delay(3, Some(100));
        assert!(third >= 1_600, "third delay {}", third);
    }

    #[test]
    fn path_root_accepts_namespace_shorthand() {
        assert_eq!(
            normalize_path_root(&Value::String("12345".to_string())),
            serde_json::json!({".tag": "root", "root": "12345"})
        );
        assert_eq!(
            normalize_path_root(&Value::String("home".to_string())),
            serde_json::json!({".tag": "home"})
        );
        let explicit = serde_json::json!({".tag": "namespace_id", "namespace_id": "7"});
        assert_eq!(normalize_path_root(&explicit), explicit);
    }

    #[test]
    fn endpoint_url_uses_host_and_version_prefix() {
        let config = DropboxConfig::new(Some("t".to_string()));
        let client = DropboxClient::new(
            Arc::new(config),
            Logger::with_level("test", crate::services::logger::LogLevel::Error),
        )
        .unwrap();
        let url = client
            .endpoint_url(&Endpoint::new(
                "files/upload",
                crate::services::config::Host::Content,
                Style::Upload,
                AuthMode::User,
            ))
            .unwrap();
        assert_eq!(url.as_str(), "https://content.dropboxapi.com/2/files/upload");
    }
}
