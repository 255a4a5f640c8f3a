use crate::services::config::Host;
use serde::{Deserialize, Serialize};

/// Dropbox request style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// JSON argument in the body, JSON result in the body.
    Rpc,
    /// Argument in `Dropbox-API-Arg`, raw file bytes in the body.
    Upload,
    /// Argument in `Dropbox-API-Arg`, metadata in `Dropbox-API-Result`, file bytes in the body.
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    User,
    Team,
    App,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub route: String,
    #[serde(default = "default_host")]
    pub host: Host,
    #[serde(default = "default_style")]
    pub style: Style,
    #[serde(default = "default_auth")]
    pub auth: AuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_host() -> Host {
    Host::Api
}

fn default_style() -> Style {
    Style::Rpc
}

fn default_auth() -> AuthMode {
    AuthMode::User
}

impl Endpoint {
    pub fn new(route: &str, host: Host, style: Style, auth: AuthMode) -> Self {
        Self {
            route: route.trim_matches('/').to_string(),
            host,
            style,
            auth,
            timeout_ms: None,
        }
    }

    /// User-authenticated RPC route on the API host.
    pub fn rpc(route: &str) -> Self {
        Self::new(route, Host::Api, Style::Rpc, AuthMode::User)
    }

    /// Team-authenticated RPC route on the API host.
    pub fn team(route: &str) -> Self {
        Self::new(route, Host::Api, Style::Rpc, AuthMode::Team)
    }

    /// Same host and auth, different route. Used for `.../continue` follow-ups.
    pub fn sibling(&self, route: &str) -> Self {
        Self {
            route: route.trim_matches('/').to_string(),
            ..self.clone()
        }
    }
}

/// How a list endpoint pages: the cursor goes to `continue_route` while `has_more_field` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub continue_route: String,
    pub items_field: String,
    #[serde(default = "default_cursor_field")]
    pub cursor_field: String,
    #[serde(default = "default_has_more_field")]
    pub has_more_field: String,
}

fn default_cursor_field() -> String {
    "cursor".to_string()
}

fn default_has_more_field() -> String {
    "has_more".to_string()
}
