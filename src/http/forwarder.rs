//! Request forwarding.
//!
//! # Data Flow
//! ```text
//! Request
//!     → RouteTable::match_path (404 when nothing matches)
//!     → MCP POST? read body (bounded) and peek the JSON-RPC method
//!     → session plan: none | bound to a session | initialize
//!     → build upstream request: rewritten path + query, client headers minus
//!       hop-by-hop and Host, X-Forwarded-*, Host for the backend, then the
//!       route's header mutations (injected values win)
//!     → checkout connection (connect phase retried for Dns/Timeout only)
//!     → send once; wait for the response head under the request deadline
//!     → activate / terminate session, strip injected names, redact error bodies
//!     → stream the body back frame by frame
//! ```
//!
//! Once a request has been handed to an upstream connection it is never
//! retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, HOST};
use axum::http::{Method, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;

use crate::config::ReinitPolicy;
use crate::http::body::ForwardedBody;
use crate::http::error::ProxyError;
use crate::http::request::{add_forwarded_headers, strip_hop_by_hop};
use crate::http::response::{media_type, prepare_headers, redact_error_body};
use crate::http::state::Runtime;
use crate::observability::metrics;
use crate::routing::{Route, RouteMatch};
use crate::session::jsonrpc::{self, RpcPeek, MCP_SESSION_ID};
use crate::session::{PendingSession, SessionGuard, SessionTracker};
use crate::upstream::{BackendRef, ConnectionPool, PooledConnection};

/// Connection facts about the client.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    /// "http" or "https", as seen by the gateway listener.
    pub scheme: &'static str,
    pub request_id: String,
}

/// How a request relates to an MCP session.
#[derive(Debug)]
enum SessionPlan {
    /// Not an MCP exchange, or no session yet.
    None,
    /// Sticky to an active session.
    Bound {
        guard: SessionGuard,
        terminate: bool,
    },
    /// An `initialize` exchange; `guard` is set when an active session is reused.
    Initialize {
        pending: PendingSession,
        guard: Option<SessionGuard>,
    },
}

impl SessionPlan {
    fn backend(&self) -> Option<Arc<BackendRef>> {
        match self {
            SessionPlan::None => None,
            SessionPlan::Bound { guard, .. } => Some(guard.session().backend.clone()),
            SessionPlan::Initialize { pending, .. } => Some(pending.backend.clone()),
        }
    }

    /// Whether the session header must be dropped before forwarding.
    fn strips_session_header(&self, client_sent: bool) -> bool {
        match self {
            SessionPlan::None => false,
            SessionPlan::Bound { guard, .. } => guard.session().assigned_by_gateway,
            SessionPlan::Initialize { guard: Some(guard), .. } => {
                guard.session().assigned_by_gateway
            }
            // Fresh initialize: any id the client sent is stale
            SessionPlan::Initialize { guard: None, .. } => client_sent,
        }
    }
}

/// Forwards requests to upstream backends.
#[derive(Debug, Clone)]
pub struct Forwarder {
    pool: Arc<ConnectionPool>,
    sessions: Arc<SessionTracker>,
}

impl Forwarder {
    pub fn new(pool: Arc<ConnectionPool>, sessions: Arc<SessionTracker>) -> Self {
        Self { pool, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Forward one request and produce the (streaming) response.
    pub async fn forward(
        &self,
        runtime: &Runtime,
        client: ClientInfo,
        request: Request<Body>,
    ) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let Some(matched) = runtime.routes.match_path(&path) else {
            tracing::warn!(request_id = %client.request_id, path = %path, "No route matched");
            metrics::record_request(method.as_str(), 404, "none", start);
            return ProxyError::RouteNotFound { path }.into_response();
        };

        let route_name = matched.route.name.clone();
        let response = match self.forward_matched(runtime, &client, matched, request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_gateway_failure() {
                    tracing::error!(
                        request_id = %client.request_id,
                        route = %route_name,
                        error = %e,
                        "Forwarding failed"
                    );
                } else {
                    tracing::info!(
                        request_id = %client.request_id,
                        route = %route_name,
                        error = %e,
                        "Request rejected"
                    );
                }
                e.into_response()
            }
        };

        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            &route_name,
            start,
        );
        response
    }

    async fn forward_matched(
        &self,
        runtime: &Runtime,
        client: &ClientInfo,
        matched: RouteMatch,
        request: Request<Body>,
    ) -> Result<Response<Body>, ProxyError> {
        let route = matched.route.clone();
        let (parts, body) = request.into_parts();

        // MCP POST bodies are read once and forwarded as the same bytes
        let (body, peek) = if route.mcp && parts.method == Method::POST {
            let bytes = read_request_body(body, runtime.max_body_bytes).await?;
            let peek = jsonrpc::peek(&bytes);
            (Body::from(bytes), peek)
        } else {
            (body, RpcPeek::default())
        };

        let client_session = session_header(&parts.headers);
        let plan = if route.mcp {
            self.plan_session(&route, &parts.method, client_session.clone(), &peek)?
        } else {
            SessionPlan::None
        };

        let backend = match plan.backend() {
            Some(backend) => backend,
            None => route.backends.select().ok_or_else(|| {
                ProxyError::Upstream(format!("backend group {:?} is empty", route.backends.name))
            })?,
        };

        tracing::debug!(
            request_id = %client.request_id,
            route = %route.name,
            backend = %backend.name,
            method = %parts.method,
            rpc_method = peek.method.as_deref().unwrap_or("-"),
            "Forwarding request"
        );

        let uri = upstream_uri(&backend, &matched.path, parts.uri.query())?;
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);
        add_forwarded_headers(&mut headers, client.addr, client.scheme);
        let authority = HeaderValue::from_str(&backend.authority())
            .map_err(|_| ProxyError::Upstream(format!("invalid authority for {}", backend.name)))?;
        headers.insert(HOST, authority);
        if plan.strips_session_header(client_session.is_some()) {
            headers.remove(MCP_SESSION_ID);
        }
        route.injector.apply(&mut headers);

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method.clone();
        *outbound.uri_mut() = uri;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = headers;

        let pool = &self.pool;
        let timeouts = &runtime.connect_timeouts;
        let target = &*backend;
        let mut conn = runtime
            .retries
            .run(move |_| pool.checkout(target, timeouts))
            .await?;

        let response = match tokio::time::timeout(
            runtime.request_timeout,
            conn.sender.send_request(outbound),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ProxyError::Upstream(e.to_string())),
            Err(_) => return Err(ProxyError::UpstreamTimeout(runtime.request_timeout)),
        };

        self.relay(runtime, &route, plan, conn, response).await
    }

    fn plan_session(
        &self,
        route: &Route,
        method: &Method,
        session_id: Option<String>,
        peek: &RpcPeek,
    ) -> Result<SessionPlan, ProxyError> {
        match (session_id, peek.is_initialize) {
            (Some(id), true) => {
                match self.sessions.policy() {
                    ReinitPolicy::Reuse => {
                        if let Some(guard) = self.lookup_owned(route, &id) {
                            let pending = self.sessions.begin(
                                guard.session().backend.clone(),
                                &route.name,
                                Some(id),
                            );
                            return Ok(SessionPlan::Initialize {
                                pending,
                                guard: Some(guard),
                            });
                        }
                    }
                    ReinitPolicy::Reset => {
                        if self.lookup_owned(route, &id).is_some() {
                            self.sessions.terminate(&id);
                        }
                    }
                }
                self.fresh_initialize(route)
            }
            (Some(id), false) => match self.lookup_owned(route, &id) {
                Some(guard) => Ok(SessionPlan::Bound {
                    guard,
                    terminate: method == Method::DELETE,
                }),
                None => Err(ProxyError::SessionExpired {
                    session_id: id,
                    request_id: peek.id.clone(),
                }),
            },
            (None, true) => self.fresh_initialize(route),
            (None, false) => Ok(SessionPlan::None),
        }
    }

    /// Look up a session as seen from `route`.
    ///
    /// A session opened through another route, or bound to a replica that is
    /// no longer in the route's group, does not exist for this route. Its
    /// backend must never receive this route's injected headers.
    fn lookup_owned(&self, route: &Route, id: &str) -> Option<SessionGuard> {
        let guard = self.sessions.lookup(id)?;
        let session = guard.session();
        if session.route == route.name && route.backends.contains(&session.backend) {
            return Some(guard);
        }
        tracing::warn!(
            route = %route.name,
            session_route = %session.route,
            backend = %session.backend.name,
            "Session id presented on a route that does not own it"
        );
        None
    }

    fn fresh_initialize(&self, route: &Route) -> Result<SessionPlan, ProxyError> {
        let backend = route.backends.select().ok_or_else(|| {
            ProxyError::Upstream(format!("backend group {:?} is empty", route.backends.name))
        })?;
        Ok(SessionPlan::Initialize {
            pending: self.sessions.begin(backend, &route.name, None),
            guard: None,
        })
    }

    async fn relay(
        &self,
        runtime: &Runtime,
        route: &Route,
        plan: SessionPlan,
        conn: PooledConnection,
        response: Response<Incoming>,
    ) -> Result<Response<Body>, ProxyError> {
        let (mut parts, incoming) = response.into_parts();
        prepare_headers(&mut parts.headers, &route.injector);
        let status = parts.status;

        if !status.is_success() {
            let guard = match plan {
                SessionPlan::Bound { guard, terminate } => {
                    // The upstream no longer knows the session either
                    if terminate && status == StatusCode::NOT_FOUND {
                        self.sessions.terminate(&guard.session().id);
                    }
                    Some(guard)
                }
                SessionPlan::Initialize { guard, .. } => guard,
                SessionPlan::None => None,
            };

            if route.injector.has_secrets() {
                let bytes = self.collect(runtime, incoming, conn).await?;
                let bytes = redact_error_body(&mut parts.headers, bytes, &route.injector);
                return Ok(Response::from_parts(parts, Body::from(bytes)));
            }
            return Ok(self.stream(runtime, route, parts, incoming, conn, guard));
        }

        match plan {
            SessionPlan::None => Ok(self.stream(runtime, route, parts, incoming, conn, None)),
            SessionPlan::Bound { guard, terminate } => {
                if terminate {
                    self.sessions.terminate(&guard.session().id);
                }
                Ok(self.stream(runtime, route, parts, incoming, conn, Some(guard)))
            }
            SessionPlan::Initialize { pending, guard } => {
                let is_json = media_type(&parts.headers).as_deref() == Some("application/json");
                let upstream_id = session_header(&parts.headers);

                if is_json {
                    let bytes = self.collect(runtime, incoming, conn).await?;
                    if jsonrpc::is_success_result(&bytes) {
                        let session = self.sessions.activate(pending, upstream_id.as_deref());
                        expose_assigned_id(&mut parts.headers, &session.id, session.assigned_by_gateway);
                    } else {
                        tracing::info!(route = %route.name, "Initialize returned an error; no session created");
                    }
                    drop(guard);
                    return Ok(Response::from_parts(parts, Body::from(bytes)));
                }

                // Event stream: the 2xx head is the success signal
                let session = self.sessions.activate(pending, upstream_id.as_deref());
                expose_assigned_id(&mut parts.headers, &session.id, session.assigned_by_gateway);
                drop(guard);
                let guard = session.enter();
                Ok(self.stream(runtime, route, parts, incoming, conn, Some(guard)))
            }
        }
    }

    fn stream(
        &self,
        runtime: &Runtime,
        route: &Route,
        parts: axum::http::response::Parts,
        incoming: Incoming,
        conn: PooledConnection,
        guard: Option<SessionGuard>,
    ) -> Response<Body> {
        let body = ForwardedBody::new(incoming, runtime.stream_idle, route.name.clone())
            .with_session(guard)
            .with_checkin(self.pool.clone(), conn);
        Response::from_parts(parts, Body::new(body))
    }

    /// Buffer a (small) upstream body, then return the connection to the pool.
    async fn collect(
        &self,
        runtime: &Runtime,
        incoming: Incoming,
        conn: PooledConnection,
    ) -> Result<Bytes, ProxyError> {
        let collected = tokio::time::timeout(
            runtime.stream_idle,
            Limited::new(incoming, runtime.max_body_bytes).collect(),
        )
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(runtime.stream_idle))?
        .map_err(|e| ProxyError::Upstream(format!("reading upstream body: {}", e)))?;

        self.pool.checkin(conn);
        Ok(collected.to_bytes())
    }
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn expose_assigned_id(headers: &mut HeaderMap, id: &str, assigned_by_gateway: bool) {
    if !assigned_by_gateway {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(id) {
        headers.insert(MCP_SESSION_ID, value);
    }
}

fn upstream_uri(backend: &BackendRef, path: &str, query: Option<&str>) -> Result<Uri, ProxyError> {
    let path = backend.upstream_path(path);
    let path_and_query = match query {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    path_and_query
        .parse()
        .map_err(|_| ProxyError::BadRequest(format!("invalid upstream path {:?}", path_and_query)))
}

async fn read_request_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::PayloadTooLarge { limit })
        }
        Err(e) => Err(ProxyError::BadRequest(format!("reading request body: {}", e))),
    }
}
