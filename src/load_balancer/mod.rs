//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → backend group identified
//!     → session bound? use the bound replica
//!     → otherwise group.rs applies the group's strategy:
//!         - round_robin.rs (rotate through replicas)
//!     → BackendRef handed to the connection pool
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless apart from their own counters
//! - Groups are rebuilt wholesale on config reload

pub mod group;
pub mod round_robin;

use std::sync::Arc;

use crate::upstream::BackendRef;

pub use group::BackendGroup;
pub use round_robin::RoundRobin;

/// Replica selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick the next replica, or `None` for an empty group.
    fn next_server(&self, backends: &[Arc<BackendRef>]) -> Option<Arc<BackendRef>>;
}
