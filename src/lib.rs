//! MCP reverse gateway.
//!
//! Sits in front of one or more MCP servers and forwards agent traffic to
//! them, adding credentials the agents never see.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing ──▶ headers ──▶ session ──▶ upstream
//!                     request id,      longest     set/remove   sticky      pool keyed by
//!                     tracing,         prefix,     + secrets    backend     (host, port, sni)
//!                     concurrency      rewrite                  binding     TLS with SNI
//!                                                                                │
//!     Client Response                                                            ▼
//!     ◀────────────── http::body ◀──────────── http::response ◀───────────── Backend
//!                     streamed frames,         hop-by-hop and                 MCP server
//!                     idle deadline            injected headers stripped
//!
//!     Cross-cutting: config (+ hot reload), observability, resilience
//!                    (connect retries), lifecycle (signals, shutdown), admin
//! ```

// Core subsystems
pub mod config;
pub mod headers;
pub mod http;
pub mod net;
pub mod routing;
pub mod session;
pub mod upstream;

// Traffic management
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
