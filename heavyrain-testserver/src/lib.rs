use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_INDEX: &str = "/";
pub const PATH_JSON: &str = "/json";
pub const PATH_USER: &str = "/users/{id}";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_HEADERS: &str = "/headers";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_REDIRECT: &str = "/redirect";
pub const PATH_QP: &str = "/qp";

pub const INDEX_BODY: &str = "<!DOCTYPE html>Hello world.";
const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";
const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const REQUEST_ID_HEADER: &str = "heavyrain-request-id";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_request_id: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl TestServerStats {
    fn observe(&self, headers: &HeaderMap) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if headers.contains_key(REQUEST_ID_HEADER) {
            self.saw_request_id.fetch_add(1, Ordering::Relaxed);
        }
        if headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
        {
            self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_request_id(&self) -> u64 {
        self.saw_request_id.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

fn with_content_type(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        body,
    )
        .into_response()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => with_content_type(status, JSON_CONTENT_TYPE, Bytes::from(bytes)),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode error").into_response(),
    }
}

async fn handle_index(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    stats.observe(&headers);
    with_content_type(
        StatusCode::OK,
        HTML_CONTENT_TYPE,
        Bytes::from_static(INDEX_BODY.as_bytes()),
    )
}

async fn handle_json(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    stats.observe(&headers);
    json_response(StatusCode::OK, &serde_json::json!({ "hello": "world." }))
}

/// Echoes a JSON body back; anything that is not JSON is a 400.
async fn handle_json_post(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    stats.observe(&headers);
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(err) => json_response(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({ "error": err.to_string() }),
        ),
    }
}

async fn handle_user(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    stats.observe(&headers);
    match id.parse::<u64>() {
        Ok(id) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "id": id, "name": format!("user-{id}") }),
        ),
        Err(_) => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "no such user" }),
        ),
    }
}

async fn handle_echo(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    stats.observe(&headers);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Returns the request headers as a JSON object with lowercase names.
async fn handle_headers(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    stats.observe(&headers);
    let seen: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).to_string(),
            )
        })
        .collect();
    json_response(StatusCode::OK, &seen)
}

async fn handle_slow(State(stats): State<TestServerStats>, headers: HeaderMap) -> &'static str {
    stats.observe(&headers);
    sleep(Duration::from_millis(50)).await;
    "slow"
}

async fn handle_status(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    Path(code): Path<u16>,
) -> StatusCode {
    stats.observe(&headers);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn handle_redirect(State(stats): State<TestServerStats>, headers: HeaderMap) -> Redirect {
    stats.observe(&headers);
    Redirect::to(PATH_INDEX)
}

async fn handle_qp(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    stats.observe(&headers);
    if query.get("foo").map(String::as_str) == Some("bar") {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// The sample application load tests run against.
pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_INDEX, get(handle_index))
        .route(PATH_JSON, get(handle_json).post(handle_json_post))
        .route(PATH_USER, get(handle_user))
        .route(PATH_ECHO, axum::routing::post(handle_echo).put(handle_echo))
        .route(PATH_HEADERS, get(handle_headers))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_REDIRECT, get(handle_redirect))
        .route(PATH_QP, get(handle_qp))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
