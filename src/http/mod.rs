//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! client connection
//!     → server.rs (Axum setup, request id, tracing, concurrency limit)
//!     → forwarder.rs (route lookup, session binding, header injection)
//!     → upstream pool (checkout, send once)
//!     → response.rs (strip hop-by-hop and injected headers)
//!     → body.rs (stream frames back, release session and connection)
//!     → client
//! ```

pub mod body;
pub mod error;
pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use error::ProxyError;
pub use forwarder::{ClientInfo, Forwarder};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
pub use state::Runtime;
