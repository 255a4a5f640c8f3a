use crate::constants::{hosts, limits, network, pagination, retry};
use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid URL: {reason}")]
    InvalidUrl { key: String, reason: String },
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
    #[error("{key} requires {requires}")]
    Incomplete { key: String, requires: String },
}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        ToolError::invalid_params(err.to_string())
            .with_code("INVALID_CONFIG")
            .with_hint("Check the DROPBOX_* environment variables")
    }
}

/// Which Dropbox host serves a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Host {
    Api,
    Content,
    Notify,
}

#[derive(Debug, Clone)]
pub struct RefreshCredentials {
    pub refresh_token: String,
    pub app_key: String,
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DropboxConfig {
    pub access_token: Option<String>,
    pub refresh: Option<RefreshCredentials>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub api_url: Url,
    pub content_url: Url,
    pub notify_url: Url,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub select_user: Option<String>,
    pub select_admin: Option<String>,
    pub max_download_bytes: usize,
    pub max_pages: usize,
}

impl DropboxConfig {
    /// Config with the public Dropbox hosts and a static token.
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh: None,
            app_key: None,
            app_secret: None,
            api_url: default_url(hosts::API),
            content_url: default_url(hosts::CONTENT),
            notify_url: default_url(hosts::NOTIFY),
            timeout_ms: network::TIMEOUT_API_REQUEST_MS,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            select_user: None,
            select_admin: None,
            max_download_bytes: limits::MAX_DOWNLOAD_BYTES,
            max_pages: pagination::MAX_PAGES,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::new(get("DROPBOX_ACCESS_TOKEN"));
        config.app_key = get("DROPBOX_APP_KEY");
        config.app_secret = get("DROPBOX_APP_SECRET");

        if let Some(refresh_token) = get("DROPBOX_REFRESH_TOKEN") {
            let app_key = config.app_key.clone().ok_or_else(|| ConfigError::Incomplete {
                key: "DROPBOX_REFRESH_TOKEN".to_string(),
                requires: "DROPBOX_APP_KEY".to_string(),
            })?;
            config.refresh = Some(RefreshCredentials {
                refresh_token,
                app_key,
                app_secret: config.app_secret.clone(),
            });
        }

        if let Some(raw) = get("DROPBOX_API_URL") {
            config.api_url = parse_url("DROPBOX_API_URL", &raw)?;
        }
        if let Some(raw) = get("DROPBOX_CONTENT_URL") {
            config.content_url = parse_url("DROPBOX_CONTENT_URL", &raw)?;
        }
        if let Some(raw) = get("DROPBOX_NOTIFY_URL") {
            config.notify_url = parse_url("DROPBOX_NOTIFY_URL", &raw)?;
        }
        if let Some(raw) = get("DROPBOX_TIMEOUT_MS") {
            config.timeout_ms = parse_positive("DROPBOX_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = get("DROPBOX_MAX_RETRIES") {
            config.max_retries = raw.parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
                key: "DROPBOX_MAX_RETRIES".to_string(),
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = get("DROPBOX_MAX_DOWNLOAD_BYTES") {
            config.max_download_bytes = parse_positive("DROPBOX_MAX_DOWNLOAD_BYTES", &raw)? as usize;
        }
        if let Some(raw) = get("DROPBOX_MAX_PAGES") {
            config.max_pages = parse_positive("DROPBOX_MAX_PAGES", &raw)? as usize;
        }
        config.select_user = get("DROPBOX_SELECT_USER");
        config.select_admin = get("DROPBOX_SELECT_ADMIN");
        Ok(config)
    }

    /// Points every host at one base URL (local proxies, fake servers).
    pub fn with_base_url(mut self, base: &str) -> Result<Self, ConfigError> {
        let url = parse_url("base_url", base)?;
        self.api_url = url.clone();
        self.content_url = url.clone();
        self.notify_url = url;
        Ok(self)
    }

    pub fn host_url(&self, host: Host) -> &Url {
        match host {
            Host::Api => &self.api_url,
            Host::Content => &self.content_url,
            Host::Notify => &self.notify_url,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.access_token.is_some() || self.refresh.is_some()
    }
}

fn default_url(raw: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|err| panic!("built-in host {raw} is not a URL: {err}"))
}

/// Base URLs always end in `/` so route joins append to any path prefix instead of replacing it.
fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            key: key.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_public_hosts() {
        let config = DropboxConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.access_token.is_none());
        assert_eq!(config.host_url(Host::Api).as_str(), "https://api.dropboxapi.com/");
        assert_eq!(config.host_url(Host::Content).as_str(), "https://content.dropboxapi.com/");
        assert_eq!(config.timeout_ms, network::TIMEOUT_API_REQUEST_MS);
        assert!(!config.has_credentials());
    }

    #[test]
    fn reads_overrides_and_ignores_blank_values() {
        let config = DropboxConfig::from_lookup(lookup(&[
            ("DROPBOX_ACCESS_TOKEN", "  sl.token  "),
            ("DROPBOX_TIMEOUT_MS", "1500"),
            ("DROPBOX_MAX_RETRIES", "0"),
            ("DROPBOX_SELECT_USER", ""),
            ("DROPBOX_API_URL", "http://127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(config.access_token.as_deref(), Some("sl.token"));
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.max_retries, 0);
        assert!(config.select_user.is_none());
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn refresh_token_requires_app_key() {
        let err = DropboxConfig::from_lookup(lookup(&[("DROPBOX_REFRESH_TOKEN", "r")]))
            .unwrap_err();
        assert!(err.to_string().contains("DROPBOX_APP_KEY"));

        let config = DropboxConfig::from_lookup(lookup(&[
            ("DROPBOX_REFRESH_TOKEN", "r"),
            ("DROPBOX_APP_KEY", "key"),
        ]))
        .unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.refresh.unwrap().app_key, "key");
    }

    #[test]
    fn base_url_path_prefix_survives_route_joins() {
        let config = DropboxConfig::new(None)
            .with_base_url("http://127.0.0.1:9000/proxy")
            .unwrap();
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:9000/proxy/");
        assert_eq!(
            config.api_url.join("2/files/get_metadata").unwrap().path(),
            "/proxy/2/files/get_metadata"
        );

        let config = DropboxConfig::from_lookup(lookup(&[(
            "DROPBOX_CONTENT_URL",
            "https://gateway.example.com/dropbox/content",
        )]))
        .unwrap();
        assert_eq!(
            config.content_url.as_str(),
            "https://gateway.example.com/dropbox/content/"
        );
    }

    #[test]
    fn rejects_bad_numbers_and_urls() {
        assert!(DropboxConfig::from_lookup(lookup(&[("DROPBOX_TIMEOUT_MS", "0")])).is_err());
        assert!(DropboxConfig::from_lookup(lookup(&[("DROPBOX_API_URL", "ftp://x")])).is_err());
    }
}
