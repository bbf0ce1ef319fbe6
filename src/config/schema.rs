//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Route definitions mapping path prefixes to backend groups.
    pub routes: Vec<RouteConfig>,

    /// Upstream server definitions.
    pub backends: Vec<BackendConfig>,

    /// Named secret sources referenced from header values.
    pub secrets: BTreeMap<String, SecretConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration for transient connect failures.
    pub retries: RetryConfig,

    /// MCP session tracking.
    pub sessions: SessionConfig,

    /// Upstream connection pool.
    pub pool: PoolConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum requests processed at once (backpressure).
    pub max_concurrent_requests: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_concurrent_requests: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Route configuration mapping a path prefix to a backend group.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Backend group name to forward to.
    pub backend_group: String,

    /// Replacement for the matched prefix. Empty or "/" strips it.
    #[serde(default)]
    pub rewrite: Option<String>,

    /// Header mutations applied in order before forwarding.
    #[serde(default)]
    pub headers: Vec<HeaderOpConfig>,

    /// Enable MCP session tracking on this route.
    #[serde(default)]
    pub mcp: bool,
}

/// A single header mutation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum HeaderOpConfig {
    /// Replace any existing value. The value may embed `${secret:NAME}`.
    Set { name: String, value: String },
    /// Drop the header entirely.
    Remove { name: String },
}

impl HeaderOpConfig {
    pub fn name(&self) -> &str {
        match self {
            HeaderOpConfig::Set { name, .. } | HeaderOpConfig::Remove { name } => name,
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Backend group this server belongs to.
    pub group: String,

    /// Base URL, e.g. "https://api.githubcopilot.com/mcp/".
    pub url: String,

    /// TLS server name to present, when it differs from the URL host.
    #[serde(default)]
    pub sni: Option<String>,

    /// PEM bundle of trusted roots replacing the built-in webpki roots.
    #[serde(default)]
    pub ca_file: Option<String>,
}

/// Where a secret value comes from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretConfig {
    /// Read from an environment variable.
    Env(String),
    /// Read from a mounted file; trailing whitespace is trimmed.
    File(String),
}

/// Timeout configuration for the different phases of a forward.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// DNS resolution plus TCP connect, in seconds.
    pub connect_secs: u64,

    /// TLS handshake, in seconds.
    pub tls_handshake_secs: u64,

    /// Time until the response head is available, in seconds.
    pub request_secs: u64,

    /// Longest gap between two response body frames, in seconds.
    pub stream_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            tls_handshake_secs: 5,
            request_secs: 30,
            stream_idle_secs: 300,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of connect attempts (1 disables retries).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// What to do when `initialize` arrives for a session that is still active.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReinitPolicy {
    /// Keep the entry and its backend binding.
    #[default]
    Reuse,
    /// Drop the entry and pick a backend afresh.
    Reset,
}

/// MCP session tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle period after which a session is evicted, in seconds.
    pub idle_timeout_secs: u64,

    /// Interval of the background eviction sweep, in seconds.
    pub sweep_interval_secs: u64,

    pub on_reinitialize: ReinitPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            sweep_interval_secs: 30,
            on_reinitialize: ReinitPolicy::Reuse,
        }
    }
}

/// Upstream connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept per (host, port, sni).
    pub max_idle_per_backend: usize,

    /// Idle connections older than this are dropped, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_backend: 32,
            idle_timeout_secs: 90,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest body the gateway holds in memory, in bytes. Applies to MCP
    /// request bodies, initialize responses and redacted error bodies.
    /// Reloadable.
    pub max_request_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 4 * 1024 * 1024, // 4MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format: "full" or "compact".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "full".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
