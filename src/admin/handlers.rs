use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::session::SessionInfo;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub config_generation: u64,
    pub routes: usize,
    pub active_sessions: usize,
    pub idle_connections: usize,
}

#[derive(Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub path_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<String>,
    pub mcp: bool,
    pub backend_group: String,
    pub backends: Vec<BackendSummary>,
    /// Names of headers set or removed. Values are never listed.
    pub injected_headers: Vec<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let runtime = state.app.runtime.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.app.started.elapsed().as_secs(),
        config_generation: runtime.generation,
        routes: runtime.routes.len(),
        active_sessions: state.app.sessions().len(),
        idle_connections: state.app.forwarder.pool().total_idle(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteSummary>> {
    let runtime = state.app.runtime.load();
    let routes = runtime
        .routes
        .routes()
        .iter()
        .map(|route| RouteSummary {
            name: route.name.clone(),
            path_prefix: route.matcher.as_str().to_string(),
            rewrite: route.rewrite.as_ref().map(|r| r.replacement().to_string()),
            mcp: route.mcp,
            backend_group: route.backends.name.clone(),
            backends: route
                .backends
                .backends()
                .iter()
                .map(|b| BackendSummary {
                    name: b.name.clone(),
                    origin: b.origin(),
                    sni: b.tls.as_ref().map(|tls| tls.sni.clone()),
                })
                .collect(),
            injected_headers: route
                .injector
                .injected_names()
                .map(|name| name.as_str().to_string())
                .collect(),
        })
        .collect();

    Json(routes)
}

pub async fn get_sessions(State(state): State<AdminState>) -> Json<Vec<SessionInfo>> {
    Json(state.app.sessions().list())
}

pub async fn delete_session(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.app.sessions().terminate(&id) {
        Some(_) => {
            tracing::info!(session_id = %id, "Session terminated by admin");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
