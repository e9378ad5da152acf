#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use tether_api_client::tether_runtime_config::ClientConfig;
use tether_api_client::{ManualTime, MemoryStore, SessionClient};

pub const T0: i64 = 1_700_000_000_000;

#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
    delay: Duration,
}

/// A request the mock server received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<Recorded>>,
}

/// In-process HTTP server with canned responses per path.
pub struct MockServer {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock server");
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Respond to `path` (including the `/api` prefix) with `status` and `body`.
    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
        self.respond_after(path, status, body, Duration::ZERO);
    }

    pub fn respond_after(&self, path: &str, status: u16, body: impl Into<String>, delay: Duration) {
        self.insert(path, status, body.into(), Vec::new(), delay);
    }

    /// Like [`Self::respond`], adding response headers such as `Set-Cookie`.
    pub fn respond_with_headers(
        &self,
        path: &str,
        status: u16,
        body: impl Into<String>,
        headers: &[(&str, &str)],
    ) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.insert(path, status, body.into(), headers, Duration::ZERO);
    }

    fn insert(
        &self,
        path: &str,
        status: u16,
        body: String,
        headers: Vec<(String, String)>,
        delay: Duration,
    ) {
        self.state.routes.lock().expect("routes lock").insert(
            path.to_string(),
            Canned {
                status,
                body,
                headers,
                delay,
            },
        );
    }

    pub fn requests(&self, path: &str) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests(path).len()
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.server.url = self.base_url.clone();
        config
    }

    /// Client on manual time starting at [`T0`], with its own clock store.
    pub fn client(&self) -> (SessionClient, Arc<ManualTime>, Arc<MemoryStore>) {
        let time = Arc::new(ManualTime::new(T0));
        let store = Arc::new(MemoryStore::new());
        let client = self.client_with(time.clone(), store.clone());
        (client, time, store)
    }

    pub fn client_with(&self, time: Arc<ManualTime>, store: Arc<MemoryStore>) -> SessionClient {
        SessionClient::builder(self.config())
            .time_source(time)
            .store(store)
            .build()
            .expect("build client")
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().expect("requests lock").push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let canned = state
        .routes
        .lock()
        .expect("routes lock")
        .get(uri.path())
        .cloned();
    let Some(canned) = canned else {
        return (StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#).into_response();
    };
    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }
    let status = StatusCode::from_u16(canned.status).expect("valid canned status");
    let mut response = (status, canned.body).into_response();
    for (name, value) in &canned.headers {
        response.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    response
}

/// Base URL of a port nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{addr}")
}

/// Client pointed at a dead port.
pub fn offline_client() -> (SessionClient, Arc<ManualTime>) {
    let mut config = ClientConfig::default();
    config.server.url = closed_port_url();
    let time = Arc::new(ManualTime::new(T0));
    let client = SessionClient::builder(config)
        .time_source(time.clone())
        .build()
        .expect("build client");
    (client, time)
}
