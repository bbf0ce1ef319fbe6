//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → compiled into a Runtime (routes, injectors, backends)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server compiles it and swaps the Runtime atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use watcher::ConfigWatcher;
pub use schema::{
    AdminConfig, BackendConfig, HeaderOpConfig, LimitsConfig, ListenerConfig, ObservabilityConfig,
    PoolConfig, ProxyConfig, ReinitPolicy, RetryConfig, RouteConfig, SecretConfig, SessionConfig,
    TimeoutConfig, TlsConfig,
};
