//! Backend descriptors.
//!
//! # Responsibilities
//! - Turn a configured base URL (+ optional SNI / CA bundle) into an
//!   immutable `BackendRef`
//! - Compute the pool identity `(host, port, sni)`
//! - Compute the outbound `Host` header and upstream path

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use url::{Host, Url};

use crate::config::{BackendConfig, ConfigError};
use crate::upstream::connector::tls_client_config;

/// TLS policy for one backend.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    /// Name presented in the ClientHello and checked against the certificate.
    pub sni: String,
    pub(crate) server_name: ServerName<'static>,
    pub(crate) config: Arc<ClientConfig>,
}

/// An upstream server. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct BackendRef {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Path prefix every upstream request is placed under ("" for none).
    pub base_path: String,
    pub tls: Option<TlsPolicy>,
}

/// Connection pool identity. Connections are never shared across keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub sni: Option<String>,
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sni {
            Some(sni) => write!(f, "{}:{} (sni {})", self.host, self.port, sni),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl BackendRef {
    /// Build from configuration, loading TLS roots when the URL is https.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let fail = |reason: String| ConfigError::Backend {
            name: config.name.clone(),
            reason,
        };

        let url = Url::parse(&config.url).map_err(|e| fail(format!("invalid url: {}", e)))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(fail("url has no host".into())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| fail("url has no port".into()))?;
        let base_path = match url.path() {
            "/" => String::new(),
            path => path.to_string(),
        };

        let tls = match url.scheme() {
            "https" => {
                let sni = config.sni.clone().unwrap_or_else(|| host.clone());
                let server_name = ServerName::try_from(sni.clone())
                    .map_err(|_| fail(format!("invalid sni {:?}", sni)))?;
                let tls_config =
                    tls_client_config(config.ca_file.as_deref().map(Path::new)).map_err(fail)?;
                Some(TlsPolicy {
                    sni,
                    server_name,
                    config: tls_config,
                })
            }
            "http" => None,
            other => return Err(fail(format!("unsupported scheme {:?}", other))),
        };

        Ok(Self {
            name: config.name.clone(),
            host,
            port,
            base_path,
            tls,
        })
    }

    /// A plain-HTTP backend.
    pub fn plain(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            base_path: String::new(),
            tls: None,
        }
    }

    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            host: self.host.clone(),
            port: self.port,
            sni: self.tls.as_ref().map(|t| t.sni.clone()),
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Value for the outbound `Host` header.
    ///
    /// The SNI name doubles as the virtual host when one is configured.
    pub fn authority(&self) -> String {
        let host = self.tls.as_ref().map(|t| t.sni.as_str()).unwrap_or(&self.host);
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let default_port = if self.tls.is_some() { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Place a (rewritten) request path under this backend's base path.
    pub fn upstream_path(&self, path: &str) -> String {
        if self.base_path.is_empty() {
            return path.to_string();
        }
        if path == "/" || path.is_empty() {
            return self.base_path.clone();
        }
        format!(
            "{}/{}",
            self.base_path.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `scheme://authority/base_path`, for logs and the admin API.
    pub fn origin(&self) -> String {
        format!("{}://{}:{}{}", self.scheme(), self.host, self.port, self.base_path)
    }
}
