//! Header mutation and credential injection.
//!
//! # Responsibilities
//! - Apply set/remove mutations to outbound request headers, in order
//! - Guarantee an injected value replaces whatever the client sent
//! - Keep injected credentials out of responses and error bodies
//!
//! # Design Decisions
//! - Header names are case-insensitive (`HeaderName` is lowercase), so a
//!   client sending `AUTHORIZATION` cannot sneak past a `Set` on `Authorization`
//! - Values that embed a secret are marked sensitive
//! - Body and method are never touched here

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use bytes::{Bytes, BytesMut};

use crate::config::HeaderOpConfig;
use crate::headers::secret::{Secret, SecretError, SecretStore};

const REDACTED: &[u8] = b"[REDACTED]";

/// Error compiling header mutations.
#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("invalid header name {0:?}")]
    InvalidName(String),
    #[error("invalid value for header {0:?}")]
    InvalidValue(String),
}

/// One compiled mutation.
#[derive(Debug, Clone)]
pub enum HeaderOp {
    Set { name: HeaderName, value: HeaderValue },
    Remove { name: HeaderName },
}

/// Ordered header mutations for one route.
#[derive(Debug, Clone, Default)]
pub struct HeaderInjector {
    ops: Vec<HeaderOp>,
    secrets: Vec<Secret>,
}

impl HeaderInjector {
    /// Compile configured mutations, resolving secret placeholders.
    pub fn compile(configs: &[HeaderOpConfig], store: &SecretStore) -> Result<Self, InjectorError> {
        let mut ops = Vec::with_capacity(configs.len());
        let mut secrets = Vec::new();

        for config in configs {
            let name = HeaderName::from_bytes(config.name().as_bytes())
                .map_err(|_| InjectorError::InvalidName(config.name().to_string()))?;

            match config {
                HeaderOpConfig::Set { value, .. } => {
                    let (expanded, used) = store.expand(value)?;
                    let mut value = HeaderValue::from_str(&expanded)
                        .map_err(|_| InjectorError::InvalidValue(name.to_string()))?;
                    if !used.is_empty() {
                        value.set_sensitive(true);
                    }
                    secrets.extend(used);
                    ops.push(HeaderOp::Set { name, value });
                }
                HeaderOpConfig::Remove { .. } => ops.push(HeaderOp::Remove { name }),
            }
        }

        Ok(Self { ops, secrets })
    }

    /// Apply all mutations in declaration order.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for op in &self.ops {
            match op {
                // `insert` drops every existing value for the name
                HeaderOp::Set { name, value } => {
                    headers.insert(name.clone(), value.clone());
                }
                HeaderOp::Remove { name } => {
                    headers.remove(name);
                }
            }
        }
    }

    /// Names this injector sets.
    pub fn injected_names(&self) -> impl Iterator<Item = &HeaderName> {
        self.ops.iter().filter_map(|op| match op {
            HeaderOp::Set { name, .. } => Some(name),
            HeaderOp::Remove { .. } => None,
        })
    }

    /// Drop injected headers from a response header map.
    pub fn strip_injected(&self, headers: &mut HeaderMap) {
        for name in self.injected_names() {
            headers.remove(name);
        }
    }

    pub fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replace every occurrence of an injected secret in `data`.
    pub fn redact(&self, data: Bytes) -> Bytes {
        let mut current = data;
        for secret in &self.secrets {
            let needle = secret.expose().as_bytes();
            if needle.is_empty() || find(&current, needle).is_none() {
                continue;
            }
            let mut out = BytesMut::with_capacity(current.len());
            let mut rest: &[u8] = &current;
            while let Some(pos) = find(rest, needle) {
                out.extend_from_slice(&rest[..pos]);
                out.extend_from_slice(REDACTED);
                rest = &rest[pos + needle.len()..];
            }
            out.extend_from_slice(rest);
            current = out.freeze();
        }
        current
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
