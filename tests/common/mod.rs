#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use dropbox_tools::app::App;
use dropbox_tools::services::config::DropboxConfig;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TEST_TOKEN: &str = "sl.test-access-token";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }

    pub fn api_arg(&self) -> Value {
        serde_json::from_str(self.header("dropbox-api-arg").expect("Dropbox-API-Arg header"))
            .expect("Dropbox-API-Arg is JSON")
    }
}

#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub delay_ms: u64,
}

/// In-process stand-in for the Dropbox hosts. Responses are queued per path; the last one
/// queued for a path keeps being served.
#[derive(Clone, Default)]
pub struct FakeDropbox {
    requests: Arc<StdMutex<Vec<Recorded>>>,
    routes: Arc<StdMutex<HashMap<String, VecDeque<Canned>>>>,
}

impl FakeDropbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, canned: Canned) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(canned);
        self
    }

    pub fn json(&self, path: &str, status: u16, body: Value) -> &Self {
        self.respond(
            path,
            Canned {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: serde_json::to_vec(&body).unwrap(),
                delay_ms: 0,
            },
        )
    }

    pub fn json_with_headers(
        &self,
        path: &str,
        status: u16,
        headers: &[(&str, &str)],
        body: Value,
    ) -> &Self {
        let mut all = vec![("content-type".to_string(), "application/json".to_string())];
        all.extend(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self.respond(
            path,
            Canned {
                status,
                headers: all,
                body: serde_json::to_vec(&body).unwrap(),
                delay_ms: 0,
            },
        )
    }

    pub fn slow_json(&self, path: &str, delay_ms: u64, body: Value) -> &Self {
        self.respond(
            path,
            Canned {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: serde_json::to_vec(&body).unwrap(),
                delay_ms,
            },
        )
    }

    pub fn text(&self, path: &str, status: u16, body: &str) -> &Self {
        self.respond(
            path,
            Canned {
                status,
                headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
                body: body.as_bytes().to_vec(),
                delay_ms: 0,
            },
        )
    }

    pub fn download(&self, path: &str, metadata: Value, body: &[u8]) -> &Self {
        self.respond(
            path,
            Canned {
                status: 200,
                headers: vec![
                    (
                        "content-type".to_string(),
                        "application/octet-stream".to_string(),
                    ),
                    ("dropbox-api-result".to_string(), metadata.to_string()),
                ],
                body: body.to_vec(),
                delay_ms: 0,
            },
        )
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn next_response(&self, path: &str) -> Option<Canned> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

async fn serve_fake(
    State(fake): State<FakeDropbox>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    fake.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: body.to_vec(),
    });

    let Some(canned) = fake.next_response(&path) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from(format!("no canned response for {}", path)))
            .unwrap();
    };
    if canned.delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(canned.delay_ms)).await;
    }
    let mut builder = Response::builder().status(canned.status);
    for (name, value) in &canned.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(canned.body)).unwrap()
}

/// Starts the fake on an ephemeral port and returns its base URL.
pub async fn start(fake: &FakeDropbox) -> String {
    let router = Router::new().fallback(serve_fake).with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn config_for(base: &str) -> DropboxConfig {
    let mut config = DropboxConfig::new(Some(TEST_TOKEN.to_string()))
        .with_base_url(base)
        .unwrap();
    config.timeout_ms = 5_000;
    config
}

pub fn app_with(config: DropboxConfig) -> App {
    App::with_config(config).unwrap()
}

pub async fn fake_app() -> (FakeDropbox, App) {
    let fake = FakeDropbox::new();
    let base = start(&fake).await;
    let app = app_with(config_for(&base));
    (fake, app)
}

/// Runs a tool and returns `result` from the success envelope.
pub async fn call_ok(app: &App, tool: &str, args: Value) -> Value {
    let envelope = app
        .tool_executor
        .execute(tool, args)
        .await
        .unwrap_or_else(|err| panic!("{} failed: {:?}", tool, err));
    assert_eq!(envelope["ok"], true);
    envelope["result"].clone()
}
