//! Admin API.
//!
//! Served on its own listener, every endpoint behind a bearer key.
//! Route listings expose header names only, never injected values.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub app: AppState,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(app: AppState, api_key: &str) -> Router {
    let state = AdminState {
        app,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/sessions/{id}", delete(delete_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
