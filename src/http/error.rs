//! Gateway error taxonomy and its HTTP mapping.
//!
//! | Error              | Status |
//! |--------------------|--------|
//! | RouteNotFound      | 404    |
//! | SessionExpired     | 404 + JSON-RPC error body |
//! | PayloadTooLarge    | 413    |
//! | BadRequest         | 400    |
//! | Connect(Timeout)   | 504    |
//! | Connect(other)     | 502    |
//! | UpstreamTimeout    | 504    |
//! | Upstream           | 502    |

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::session::jsonrpc;
use crate::upstream::{ConnectError, ConnectErrorKind};

/// Why a request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("no route matches {path}")]
    RouteNotFound { path: String },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("session {session_id} not found or expired")]
    SessionExpired {
        session_id: String,
        /// JSON-RPC id of the rejected request, echoed in the error body.
        request_id: Option<Value>,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound { .. } | ProxyError::SessionExpired { .. } => {
                StatusCode::NOT_FOUND
            }
            ProxyError::Connect(e) if e.kind() == ConnectErrorKind::Timeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProxyError::Connect(_) | ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Failures on the gateway/upstream side rather than the client's.
    pub fn is_gateway_failure(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ProxyError::SessionExpired { request_id, .. } => {
                (status, Json(jsonrpc::session_expired(request_id.as_ref()))).into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}
