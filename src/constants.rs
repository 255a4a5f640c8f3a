pub mod server {
    pub const NAME: &str = "dropbox-tools";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const PROTOCOL_VERSION: &str = "2025-06-18";
}

pub mod hosts {
    pub const API: &str = "https://api.dropboxapi.com";
    pub const CONTENT: &str = "https://content.dropboxapi.com";
    pub const NOTIFY: &str = "https://notify.dropboxapi.com";
    pub const API_VERSION_PREFIX: &str = "/2/";
    pub const TOKEN_PATH: &str = "/oauth2/token";
}

/// Lowercase so they can be used directly as `HeaderName`s.
pub mod headers {
    pub const API_ARG: &str = "dropbox-api-arg";
    pub const API_RESULT: &str = "dropbox-api-result";
    pub const SELECT_USER: &str = "dropbox-api-select-user";
    pub const SELECT_ADMIN: &str = "dropbox-api-select-admin";
    pub const PATH_ROOT: &str = "dropbox-api-path-root";
    pub const RETRY_AFTER: &str = "retry-after";
}

pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    /// Added on top of the caller's longpoll `timeout` (seconds) to get the request timeout.
    pub const LONGPOLL_GRACE_MS: u64 = 90_000;
    pub const USER_AGENT: &str = concat!("dropbox-tools/", env!("CARGO_PKG_VERSION"));
}

pub mod retry {
    pub const DEFAULT_MAX_RETRIES: usize = 2;
    pub const BASE_DELAY_MS: u64 = 500;
    pub const MAX_DELAY_MS: u64 = 5_000;
    pub const MAX_RETRY_AFTER_MS: u64 = 60_000;
    pub const JITTER: f64 = 0.2;
    pub const STATUS_CODES: &[u16] = &[429, 503];
}

pub mod pagination {
    pub const MAX_PAGES: usize = 10;
}

pub mod limits {
    pub const MAX_DOWNLOAD_BYTES: usize = 10 * 1024 * 1024;
    /// Dropbox rejects single-request uploads above 150 MiB.
    pub const MAX_UPLOAD_BYTES: usize = 150 * 1024 * 1024;
    pub const ERROR_TEXT_BYTES: usize = 2048;
    pub const LOG_STRING_BYTES: usize = 512;
}

pub mod auth {
    /// Refreshed tokens are dropped this long before Dropbox says they expire.
    pub const TOKEN_EXPIRY_MARGIN_MS: u64 = 60_000;
}

pub mod content_hash {
    pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;
}
