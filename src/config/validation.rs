//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backend groups,
//!   header values reference declared secrets)
//! - Validate value ranges (timeouts > 0, URLs parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Each resource kind is validated on its own
//! - Validation is pure: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::{BackendConfig, HeaderOpConfig, ProxyConfig, RouteConfig};
use crate::headers::secret::secret_references;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener: invalid bind address {0:?}")]
    BindAddress(String),
    #[error("route {route:?}: {reason}")]
    Route { route: String, reason: String },
    #[error("backend {backend:?}: {reason}")]
    Backend { backend: String, reason: String },
    #[error("secret {0:?}: empty source")]
    Secret(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("admin: api_key must be set when the admin API is enabled")]
    AdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::AdminKey);
    }

    let positive = [
        (config.listener.max_concurrent_requests as u64, "listener.max_concurrent_requests"),
        (config.timeouts.connect_secs, "timeouts.connect_secs"),
        (config.timeouts.tls_handshake_secs, "timeouts.tls_handshake_secs"),
        (config.timeouts.request_secs, "timeouts.request_secs"),
        (config.timeouts.stream_idle_secs, "timeouts.stream_idle_secs"),
        (config.retries.max_attempts as u64, "retries.max_attempts"),
        (config.sessions.idle_timeout_secs, "sessions.idle_timeout_secs"),
        (config.sessions.sweep_interval_secs, "sessions.sweep_interval_secs"),
        (config.limits.max_request_body_bytes as u64, "limits.max_request_body_bytes"),
    ];
    for (value, field) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    for (name, source) in &config.secrets {
        let empty = match source {
            crate::config::SecretConfig::Env(var) => var.is_empty(),
            crate::config::SecretConfig::File(path) => path.is_empty(),
        };
        if empty {
            errors.push(ValidationError::Secret(name.clone()));
        }
    }

    let mut backend_names = HashSet::new();
    for backend in &config.backends {
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(ValidationError::Backend {
                backend: backend.name.clone(),
                reason: "duplicate backend name".into(),
            });
        }
        validate_backend(backend, &mut errors);
    }

    let groups: HashSet<&str> = config.backends.iter().map(|b| b.group.as_str()).collect();
    let mut route_names = HashSet::new();
    for route in &config.routes {
        if !route_names.insert(route.name.as_str()) {
            errors.push(route_error(route, "duplicate route name"));
        }
        if !groups.contains(route.backend_group.as_str()) {
            errors.push(route_error(
                route,
                &format!("unknown backend group {:?}", route.backend_group),
            ));
        }
        validate_route(route, config, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn route_error(route: &RouteConfig, reason: &str) -> ValidationError {
    ValidationError::Route {
        route: route.name.clone(),
        reason: reason.to_string(),
    }
}

fn validate_route(route: &RouteConfig, config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if !route.path_prefix.starts_with('/') {
        errors.push(route_error(route, "path_prefix must start with '/'"));
    }
    if let Some(rewrite) = &route.rewrite {
        if !rewrite.is_empty() && !rewrite.starts_with('/') {
            errors.push(route_error(route, "rewrite must be empty or start with '/'"));
        }
    }

    for op in &route.headers {
        if HeaderName::from_bytes(op.name().as_bytes()).is_err() {
            errors.push(route_error(route, &format!("invalid header name {:?}", op.name())));
        }
        if let HeaderOpConfig::Set { value, .. } = op {
            match secret_references(value) {
                Ok(names) => {
                    for name in names {
                        if !config.secrets.contains_key(name) {
                            errors.push(route_error(route, &format!("unknown secret {:?}", name)));
                        }
                    }
                }
                Err(reason) => errors.push(route_error(route, &reason)),
            }
        }
    }
}

fn validate_backend(backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    let fail = |reason: String| ValidationError::Backend {
        backend: backend.name.clone(),
        reason,
    };

    match url::Url::parse(&backend.url) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                errors.push(fail(format!("unsupported scheme {:?}", url.scheme())));
            }
            if url.host_str().is_none() {
                errors.push(fail("url has no host".into()));
            }
            if url.scheme() == "http" && (backend.sni.is_some() || backend.ca_file.is_some()) {
                errors.push(fail("sni/ca_file require an https url".into()));
            }
        }
        Err(e) => errors.push(fail(format!("invalid url: {}", e))),
    }

    if let Some(sni) = &backend.sni {
        if rustls::pki_types::ServerName::try_from(sni.as_str()).is_err() {
            errors.push(fail(format!("invalid sni {:?}", sni)));
        }
    }
}
