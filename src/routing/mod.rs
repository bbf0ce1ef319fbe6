//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (scan routes, keep the longest matching prefix)
//!     → matcher.rs (segment-boundary prefix test)
//!     → rewrite.rs (replace the matched prefix)
//!     → Return: matched Route + rewritten path, or NotFound
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[] + backend groups + secrets
//!     → compile matchers, rewrites, header injectors
//!     → freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Longest prefix wins; equal prefixes resolve to the first registered route

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use rewrite::PathRewrite;
pub use router::{Route, RouteMatch, RouteTable};
