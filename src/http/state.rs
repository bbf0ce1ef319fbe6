//! Compiled, hot-swappable runtime.
//!
//! Everything a request needs that may change on config reload lives in one
//! immutable [`Runtime`], published through `ArcSwap`. A request loads the
//! current runtime once and uses it to the end, so a reload never mixes two
//! configurations within one request.

use std::time::Duration;

use crate::config::{ConfigError, ProxyConfig};
use crate::resilience::RetryPolicy;
use crate::routing::RouteTable;
use crate::upstream::ConnectTimeouts;

#[derive(Debug)]
pub struct Runtime {
    pub routes: RouteTable,
    pub connect_timeouts: ConnectTimeouts,
    /// Deadline for the upstream response head.
    pub request_timeout: Duration,
    /// Longest gap between response body frames.
    pub stream_idle: Duration,
    pub retries: RetryPolicy,
    /// Largest body the gateway buffers for inspection or redaction.
    pub max_body_bytes: usize,
    /// Incremented on every successful reload.
    pub generation: u64,
}

impl Runtime {
    pub fn compile(config: &ProxyConfig, generation: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            routes: RouteTable::compile(config)?,
            connect_timeouts: ConnectTimeouts::from(&config.timeouts),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            stream_idle: Duration::from_secs(config.timeouts.stream_idle_secs),
            retries: RetryPolicy::from(&config.retries),
            max_body_bytes: config.limits.max_request_body_bytes,
            generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_policies_from_config() {
        let mut config = ProxyConfig::default();
        config.timeouts.connect_secs = 2;
        config.retries.max_attempts = 5;

        let runtime = Runtime::compile(&config, 3).unwrap();
        assert!(runtime.routes.is_empty());
        assert_eq!(runtime.connect_timeouts.connect, Duration::from_secs(2));
        assert_eq!(runtime.retries.max_attempts, 5);
        assert_eq!(runtime.generation, 3);
    }
}
