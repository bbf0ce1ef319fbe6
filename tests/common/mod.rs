//! Shared utilities for integration tests.
//!
//! `MockMcp` is a small axum server standing in for an MCP backend. It
//! records every request it receives and answers:
//! - `initialize` with a JSON result and an `Mcp-Session-Id` unless disabled.
//!   A replayed `initialize` carrying a session id keeps that id
//! - other JSON-RPC calls with a result naming the replica
//! - `DELETE` with 200
//! - `GET .../stream` with an event stream whose second event waits for
//!   [`MockMcp::release_stream`]; [`MockMcp::stream_dropped`] reports when
//!   the server let go of it
//! - `.../denied` with 401 and a body echoing the Authorization header

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use mcp_gateway::config::{parse_config, ProxyConfig};
use mcp_gateway::http::AppState;
use mcp_gateway::{HttpServer, Shutdown};

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct MockState {
    name: &'static str,
    issue_session_ids: bool,
    sessions_issued: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
    release: Arc<Notify>,
    stream_dropped: Arc<AtomicBool>,
}

/// Sets its flag when the event stream holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct MockMcp {
    pub addr: SocketAddr,
    pub name: &'static str,
    state: MockState,
}

impl MockMcp {
    pub async fn start(name: &'static str) -> Self {
        Self::start_with(name, true).await
    }

    /// A backend that never returns a session id on initialize.
    pub async fn start_stateless(name: &'static str) -> Self {
        Self::start_with(name, false).await
    }

    async fn start_with(name: &'static str, issue_session_ids: bool) -> Self {
        let state = MockState {
            name,
            issue_session_ids,
            sessions_issued: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            release: Arc::new(Notify::new()),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, name, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.state.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Seen {
        self.seen().pop().expect("backend saw no request")
    }

    pub fn request_count(&self) -> usize {
        self.state.seen.lock().unwrap().len()
    }

    /// Let a held event stream send its final event.
    pub fn release_stream(&self) {
        self.state.release.notify_one();
    }

    /// Whether the server has dropped an event stream, finished or not.
    pub fn stream_dropped(&self) -> bool {
        self.state.stream_dropped.load(Ordering::SeqCst)
    }
}

async fn handle(State(state): State<MockState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    let path = parts.uri.path().to_string();
    state.seen.lock().unwrap().push(Seen {
        method: parts.method.clone(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers: parts.headers.clone(),
        body: body.clone(),
    });

    if path.ends_with("/denied") {
        let auth = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("content-type", "text/plain")
            .body(Body::from(format!("rejected credential: {}", auth)))
            .unwrap();
    }

    if parts.method == Method::GET && path.ends_with("/stream") {
        return event_stream(state.release.clone(), state.stream_dropped.clone());
    }

    if parts.method == Method::DELETE {
        return Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap();
    }

    let rpc: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let id = rpc.get("id").cloned().unwrap_or(Value::Null);
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        // Responses echo credentials; the gateway must strip them
        .header(
            "authorization",
            parts
                .headers
                .get("authorization")
                .cloned()
                .unwrap_or_else(|| "none".parse().unwrap()),
        );

    let result = if rpc.get("method").and_then(Value::as_str) == Some("initialize") {
        if let Some(existing) = parts.headers.get("mcp-session-id") {
            response = response.header("mcp-session-id", existing.clone());
        } else if state.issue_session_ids {
            let n = state.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
            response = response.header("mcp-session-id", format!("{}-session-{}", state.name, n));
        }
        json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "serverInfo": { "name": state.name, "version": "1.0" }
        })
    } else {
        json!({ "backend": state.name })
    };

    let payload = json!({ "jsonrpc": "2.0", "id": id, "result": result });
    response
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

fn event_stream(release: Arc<Notify>, dropped: Arc<AtomicBool>) -> Response {
    let flag = DropFlag(dropped);
    let events = futures_util::stream::iter(0..2).then(move |i| {
        let release = release.clone();
        let _held = &flag;
        async move {
            if i == 1 {
                release.notified().await;
                Ok::<_, Infallible>(Bytes::from_static(b"event: message\ndata: {\"done\":true}\n\n"))
            } else {
                Ok(Bytes::from_static(b"event: message\ndata: {\"progress\":1}\n\n"))
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(events))
        .unwrap()
}

/// A running gateway bound to an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl Gateway {
    pub async fn start(config_toml: &str) -> Self {
        let config = parse_config(config_toml).unwrap();
        let server = HttpServer::new(config).unwrap();
        let state = server.state().clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let (updates, config_updates) = mpsc::unbounded_channel();
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, config_updates, server_shutdown).await;
        });

        Self {
            addr,
            state,
            shutdown,
            updates,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Push a new configuration as the file watcher would.
    pub fn push_config(&self, config_toml: &str) {
        self.updates.send(parse_config(config_toml).unwrap()).unwrap();
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Write `value` to a secret file inside `dir` and return its path.
pub fn secret_file(dir: &tempfile::TempDir, name: &str, value: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("{}\n", value)).unwrap();
    path.display().to_string()
}

pub fn rpc(id: u64, method: &str) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": {} }).to_string()
}

pub fn initialize(id: u64) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "test-agent", "version": "1.0" }
        }
    })
    .to_string()
}
