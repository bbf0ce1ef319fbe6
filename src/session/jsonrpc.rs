//! Just enough JSON-RPC to drive session tracking.
//!
//! Bodies are inspected, never modified: the forwarder sends the exact bytes
//! it read.

use axum::http::HeaderName;
use serde_json::{json, Value};

/// Session header of the streamable HTTP transport. Header names are
/// case-insensitive, so this also matches `mcp-session-id`.
pub const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

/// JSON-RPC error code returned for unknown or evicted sessions.
pub const SESSION_EXPIRED_CODE: i64 = -32001;

const INITIALIZE: &str = "initialize";

/// What the gateway learned from a request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcPeek {
    /// Method of the (first) message.
    pub method: Option<String>,
    /// Request id to echo in gateway-generated errors.
    pub id: Option<Value>,
    /// The body carries an `initialize` request.
    pub is_initialize: bool,
}

/// Inspect a request body. Anything that is not JSON-RPC yields an empty peek.
pub fn peek(body: &[u8]) -> RpcPeek {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return RpcPeek::default();
    };

    match value {
        Value::Object(_) => peek_message(&value),
        Value::Array(messages) => {
            let initialize = messages
                .iter()
                .find(|m| m.get("method").and_then(Value::as_str) == Some(INITIALIZE));
            match initialize.or_else(|| messages.first()) {
                Some(message) => peek_message(message),
                None => RpcPeek::default(),
            }
        }
        _ => RpcPeek::default(),
    }
}

fn peek_message(message: &Value) -> RpcPeek {
    let method = message
        .get("method")
        .and_then(Value::as_str)
        .map(String::from);
    RpcPeek {
        is_initialize: method.as_deref() == Some(INITIALIZE),
        method,
        id: message.get("id").cloned(),
    }
}

/// True when a JSON response body carries a JSON-RPC `result`.
pub fn is_success_result(body: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map.contains_key("result") && !map.contains_key("error"),
        Ok(Value::Array(messages)) => messages.iter().any(|m| m.get("result").is_some()),
        _ => false,
    }
}

/// Error envelope returned when a session id is unknown or evicted.
pub fn session_expired(id: Option<&Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.cloned().unwrap_or(Value::Null),
        "error": {
            "code": SESSION_EXPIRED_CODE,
            "message": "Session not found or expired; send initialize to start a new session",
        }
    })
}
