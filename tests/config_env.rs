mod common;
use common::ENV_LOCK;

use dropbox_tools::app::App;
use dropbox_tools::services::config::DropboxConfig;

const KEYS: &[&str] = &[
    "DROPBOX_ACCESS_TOKEN",
    "DROPBOX_REFRESH_TOKEN",
    "DROPBOX_APP_KEY",
    "DROPBOX_APP_SECRET",
    "DROPBOX_API_URL",
    "DROPBOX_CONTENT_URL",
    "DROPBOX_TIMEOUT_MS",
    "DROPBOX_MAX_PAGES",
    "DROPBOX_SELECT_USER",
];

fn snapshot() -> Vec<(&'static str, Option<String>)> {
    KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect()
}

fn restore_env(saved: Vec<(&'static str, Option<String>)>) {
    for (key, previous) in saved {
        match previous {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[tokio::test]
async fn from_env_reads_credentials_and_overrides() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();
    clear_env();

    std::env::set_var("DROPBOX_ACCESS_TOKEN", "sl.from-env");
    std::env::set_var("DROPBOX_CONTENT_URL", "http://127.0.0.1:8081");
    std::env::set_var("DROPBOX_TIMEOUT_MS", "2500");
    std::env::set_var("DROPBOX_MAX_PAGES", "3");
    std::env::set_var("DROPBOX_SELECT_USER", "dbmid:admin");

    let config = DropboxConfig::from_env().unwrap();
    assert_eq!(config.access_token.as_deref(), Some("sl.from-env"));
    assert_eq!(config.content_url.as_str(), "http://127.0.0.1:8081/");
    assert_eq!(config.api_url.as_str(), "https://api.dropboxapi.com/");
    assert_eq!(config.timeout_ms, 2500);
    assert_eq!(config.max_pages, 3);
    assert_eq!(config.select_user.as_deref(), Some("dbmid:admin"));
    assert!(config.refresh.is_none());

    restore_env(saved);
}

#[tokio::test]
async fn refresh_token_without_app_key_is_rejected() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();
    clear_env();

    std::env::set_var("DROPBOX_REFRESH_TOKEN", "refresh");
    let err = DropboxConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("DROPBOX_APP_KEY"));

    let err = App::initialize().err().expect("initialize must fail");
    assert_eq!(err.code, "INVALID_CONFIG");

    restore_env(saved);
}

#[tokio::test]
async fn app_starts_without_credentials() {
    let _guard = ENV_LOCK.lock().await;
    let saved = snapshot();
    clear_env();

    let app = App::initialize().unwrap();
    assert!(!app.config.has_credentials());
    let err = app
        .tool_executor
        .execute("get_current_account", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code, "MISSING_TOKEN");

    restore_env(saved);
}
