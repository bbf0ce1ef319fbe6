//! MCP session tracking.
//!
//! # Data Flow
//! ```text
//! POST on an MCP route
//!     → jsonrpc.rs (peek method / id, body bytes untouched)
//!     → initialize?   tracker.rs begin() → forward → activate() on success
//!     → Mcp-Session-Id present?
//!         known   → bound backend (sticky), SessionGuard held until the body ends
//!         unknown → SessionExpired (404 + JSON-RPC error)
//!     → DELETE with the header → forward, then terminate()
//!
//! Background: sweeper evicts idle sessions with nothing in flight.
//! ```

pub mod jsonrpc;
pub mod tracker;

pub use jsonrpc::{RpcPeek, MCP_SESSION_ID, SESSION_EXPIRED_CODE};
pub use tracker::{
    McpSession, PendingSession, SessionGuard, SessionInfo, SessionState, SessionTracker,
};
