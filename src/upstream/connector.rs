//! Outbound connection establishment.
//!
//! # Phases
//! ```text
//! DNS lookup ──► TCP connect ──► [TLS handshake with SNI] ──► HTTP/1.1 handshake
//!   Dns            Refused          TlsHandshake
//!   ╰───── Timeout (connect deadline) ╯   Timeout (handshake deadline)
//! ```
//!
//! Each failure is reported as a distinct [`ConnectError`] kind so the
//! forwarder can decide between retrying and failing fast.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::TimeoutConfig;
use crate::upstream::backend::BackendRef;

/// Phase that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    Connect,
    TlsHandshake,
}

impl fmt::Display for ConnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectPhase::Connect => f.write_str("connect"),
            ConnectPhase::TlsHandshake => f.write_str("TLS handshake"),
        }
    }
}

/// Why a connection could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("DNS resolution failed for {host}: {reason}")]
    Dns { host: String, reason: String },
    #[error("{phase} to {target} timed out after {after:?}")]
    Timeout {
        target: String,
        phase: ConnectPhase,
        after: Duration,
    },
    #[error("TLS handshake with {sni} failed: {reason}")]
    TlsHandshake { sni: String, reason: String },
    #[error("connection to {target} refused: {reason}")]
    Refused { target: String, reason: String },
}

/// Coarse classification of a [`ConnectError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectErrorKind {
    Dns,
    Timeout,
    TlsHandshake,
    Refused,
}

impl ConnectErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectErrorKind::Dns => "dns",
            ConnectErrorKind::Timeout => "timeout",
            ConnectErrorKind::TlsHandshake => "tls_handshake",
            ConnectErrorKind::Refused => "refused",
        }
    }
}

impl ConnectError {
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            ConnectError::Dns { .. } => ConnectErrorKind::Dns,
            ConnectError::Timeout { .. } => ConnectErrorKind::Timeout,
            ConnectError::TlsHandshake { .. } => ConnectErrorKind::TlsHandshake,
            ConnectError::Refused { .. } => ConnectErrorKind::Refused,
        }
    }
}

/// Deadlines for the connect phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeouts {
    pub connect: Duration,
    pub tls_handshake: Duration,
}

impl From<&TimeoutConfig> for ConnectTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            tls_handshake: Duration::from_secs(config.tls_handshake_secs),
        }
    }
}

/// Open a new HTTP/1.1 connection to `backend`.
pub async fn connect(
    backend: &BackendRef,
    timeouts: &ConnectTimeouts,
) -> Result<SendRequest<Body>, ConnectError> {
    let target = format!("{}:{}", backend.host, backend.port);

    let stream = timeout(timeouts.connect, open_tcp(backend, &target))
        .await
        .map_err(|_| ConnectError::Timeout {
            target: target.clone(),
            phase: ConnectPhase::Connect,
            after: timeouts.connect,
        })??;
    let _ = stream.set_nodelay(true);

    match &backend.tls {
        None => http_handshake(stream, &target).await,
        Some(tls) => {
            let connector = TlsConnector::from(tls.config.clone());
            let tls_stream = timeout(
                timeouts.tls_handshake,
                connector.connect(tls.server_name.clone(), stream),
            )
            .await
            .map_err(|_| ConnectError::Timeout {
                target: target.clone(),
                phase: ConnectPhase::TlsHandshake,
                after: timeouts.tls_handshake,
            })?
            .map_err(|e| ConnectError::TlsHandshake {
                sni: tls.sni.clone(),
                reason: e.to_string(),
            })?;

            tracing::debug!(target = %target, sni = %tls.sni, "TLS session established");
            http_handshake(tls_stream, &target).await
        }
    }
}

async fn open_tcp(backend: &BackendRef, target: &str) -> Result<TcpStream, ConnectError> {
    let addrs: Vec<SocketAddr> = lookup_host((backend.host.as_str(), backend.port))
        .await
        .map_err(|e| ConnectError::Dns {
            host: backend.host.clone(),
            reason: e.to_string(),
        })?
        .collect();

    let mut last_error = ConnectError::Dns {
        host: backend.host.clone(),
        reason: "no addresses returned".into(),
    };

    // Try every resolved address in order
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(addr = %addr, error = %e, "TCP connect attempt failed");
                last_error = match e.kind() {
                    std::io::ErrorKind::TimedOut => ConnectError::Timeout {
                        target: target.to_string(),
                        phase: ConnectPhase::Connect,
                        after: Duration::ZERO,
                    },
                    _ => ConnectError::Refused {
                        target: addr.to_string(),
                        reason: e.to_string(),
                    },
                };
            }
        }
    }

    Err(last_error)
}

async fn http_handshake<T>(io: T, target: &str) -> Result<SendRequest<Body>, ConnectError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| ConnectError::Refused {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

    let target = target.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(target = %target, error = %e, "Upstream connection closed with error");
        }
    });

    Ok(sender)
}

/// Build a rustls client config trusting webpki roots, or the PEM bundle at `ca_file`.
pub fn tls_client_config(ca_file: Option<&Path>) -> Result<Arc<ClientConfig>, String> {
    let mut roots = RootCertStore::empty();
    match ca_file {
        Some(path) => {
            let file = File::open(path).map_err(|e| format!("cannot open {:?}: {}", path, e))?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| format!("invalid PEM in {:?}: {}", path, e))?;
                roots
                    .add(cert)
                    .map_err(|e| format!("rejected certificate in {:?}: {}", path, e))?;
            }
            if roots.is_empty() {
                return Err(format!("no certificates found in {:?}", path));
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| e.to_string())?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
