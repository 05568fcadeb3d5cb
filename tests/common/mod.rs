//! Loopback axum server serving canned replies.
//!
//! Routes are matched on the full request target first (`/path?query`), then on the
//! path alone. Each route replays its responses in order and repeats the last one.

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use cads_api_client::ApiClient;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const KEY: &str = "00112233-4455-6677-c899-aabbccddeeff";

#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn bytes(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/octet-stream".into())],
            body: body.to_vec(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.status);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        builder
            .body(Body::from(self.body))
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(String, String), VecDeque<MockResponse>>,
    requests: Vec<Recorded>,
}

type SharedState = Arc<Mutex<MockState>>;

pub struct MockServer {
    addr: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");
        let state = SharedState::default();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new().fallback(reply).with_state(state.clone());
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Base URL of the API, e.g. `http://127.0.0.1:4242/api`.
    pub fn api(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Absolute URL for an API path such as `retrieve/v1/jobs`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api(), path.trim_start_matches('/'))
    }

    /// Client with short sleeps and no progress bar.
    pub fn client(&self) -> ApiClient {
        self.client_with_key(KEY)
    }

    pub fn client_with_key(&self, key: &str) -> ApiClient {
        ApiClient::new(Some(self.api()), Some(key.to_string()), Some(true))
            .expect("client")
            .with_progress(false)
            .with_sleep_max(Duration::from_millis(20))
            .with_retry_after(Duration::from_millis(5))
            .with_maximum_tries(5)
    }

    /// Registers replies for `method` on an API path (optionally with `?query`).
    pub fn mock(&self, method: &str, path: &str, responses: Vec<MockResponse>) {
        let target = format!("/api/{}", path.trim_start_matches('/'));
        self.state
            .lock()
            .unwrap()
            .routes
            .insert((method.to_string(), target), responses.into_iter().collect());
    }

    /// Requests received on an API path (query ignored).
    pub fn requests(&self, method: &str, path: &str) -> Vec<Recorded> {
        let path = format!("/api/{}", path.trim_start_matches('/'));
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.requests(method, path).len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn reply(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = method.as_str().to_string();
    let path = uri.path().to_string();
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let mut state = state.lock().unwrap();
    state.requests.push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: body.to_vec(),
    });

    let exact = (method.clone(), target.clone());
    let key = if state.routes.contains_key(&exact) {
        exact
    } else {
        (method.clone(), path)
    };
    let picked = match state.routes.get_mut(&key) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
    };

    match picked {
        Some(response) => response.into_response(),
        None => MockResponse::json(
            StatusCode::NOT_FOUND.as_u16(),
            serde_json::json!({"title": format!("no route for {} {}", method, target)}),
        )
        .into_response(),
    }
}
