//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from upstream responses
//! - Strip every header name the route injects, so credentials never echo back
//! - Redact injected secrets from non-2xx bodies
//!
//! # Design Decisions
//! - Success bodies stream untouched; only error bodies are buffered, and
//!   only when the route injects a secret
//! - A redacted body loses the upstream `Content-Length`

use axum::http::header::{self, HeaderMap};
use bytes::Bytes;

use crate::headers::HeaderInjector;
use crate::http::request::strip_hop_by_hop;

/// Clean upstream response headers before they reach the client.
pub fn prepare_headers(headers: &mut HeaderMap, injector: &HeaderInjector) {
    strip_hop_by_hop(headers);
    injector.strip_injected(headers);
}

/// Redact an error body collected from the upstream.
pub fn redact_error_body(headers: &mut HeaderMap, body: Bytes, injector: &HeaderInjector) -> Bytes {
    headers.remove(header::CONTENT_LENGTH);
    injector.redact(body)
}

/// Media type of a response, lowercased, without parameters.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}
