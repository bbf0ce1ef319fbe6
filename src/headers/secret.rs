//! Secret providers.
//!
//! Header values may embed `${secret:NAME}` placeholders. Each NAME is declared
//! under `[secrets]` with a source; the value is read when a route table is
//! compiled (startup and every reload) so rotated files are picked up.
//!
//! Secret values only ever live inside [`Secret`], whose `Debug` is redacted
//! and which has no `Display`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::SecretConfig;

const PLACEHOLDER_OPEN: &str = "${secret:";

/// Error resolving a secret.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {name:?}: environment variable {var} is not set")]
    MissingEnv { name: String, var: String },
    #[error("secret {name:?}: cannot read {path:?}: {source}")]
    File {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("secret {0:?} is empty")]
    Empty(String),
    #[error("secret {0:?} is not declared")]
    Unknown(String),
    #[error("malformed secret placeholder: {0}")]
    Placeholder(String),
}

/// A resolved secret value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[cfg(test)]
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access to the raw value is limited to the header layer.
    pub(super) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// A source of secret material.
pub trait SecretProvider: Send + Sync + fmt::Debug {
    /// Read the current value.
    fn load(&self) -> Result<Secret, SecretError>;
}

/// Reads a secret from an environment variable.
#[derive(Debug)]
pub struct EnvSecret {
    name: String,
    var: String,
}

impl SecretProvider for EnvSecret {
    fn load(&self) -> Result<Secret, SecretError> {
        let value = std::env::var(&self.var).map_err(|_| SecretError::MissingEnv {
            name: self.name.clone(),
            var: self.var.clone(),
        })?;
        non_empty(&self.name, value)
    }
}

/// Reads a secret from a mounted file.
#[derive(Debug)]
pub struct FileSecret {
    name: String,
    path: PathBuf,
}

impl SecretProvider for FileSecret {
    fn load(&self) -> Result<Secret, SecretError> {
        let value = std::fs::read_to_string(&self.path).map_err(|source| SecretError::File {
            name: self.name.clone(),
            path: self.path.clone(),
            source,
        })?;
        non_empty(&self.name, value.trim_end().to_string())
    }
}

fn non_empty(name: &str, value: String) -> Result<Secret, SecretError> {
    if value.is_empty() {
        Err(SecretError::Empty(name.to_string()))
    } else {
        Ok(Secret(value))
    }
}

/// Declared secret sources, keyed by name.
#[derive(Debug, Default)]
pub struct SecretStore {
    providers: BTreeMap<String, Box<dyn SecretProvider>>,
}

impl SecretStore {
    pub fn from_config(secrets: &BTreeMap<String, SecretConfig>) -> Self {
        let providers = secrets
            .iter()
            .map(|(name, source)| {
                let provider: Box<dyn SecretProvider> = match source {
                    SecretConfig::Env(var) => Box::new(EnvSecret {
                        name: name.clone(),
                        var: var.clone(),
                    }),
                    SecretConfig::File(path) => Box::new(FileSecret {
                        name: name.clone(),
                        path: PathBuf::from(path),
                    }),
                };
                (name.clone(), provider)
            })
            .collect();
        Self { providers }
    }

    /// Register a provider directly.
    pub fn insert(&mut self, name: impl Into<String>, provider: Box<dyn SecretProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Substitute every placeholder in `template`.
    ///
    /// Returns the expanded value and the secrets it embeds.
    pub(crate) fn expand(&self, template: &str) -> Result<(String, Vec<Secret>), SecretError> {
        let mut out = String::with_capacity(template.len());
        let mut used = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            let end = after
                .find('}')
                .ok_or_else(|| SecretError::Placeholder(template.to_string()))?;
            let name = &after[..end];
            let secret = self
                .providers
                .get(name)
                .ok_or_else(|| SecretError::Unknown(name.to_string()))?
                .load()?;
            out.push_str(secret.expose());
            used.push(secret);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok((out, used))
    }
}

/// Names of the secrets referenced by a header value template.
pub fn secret_references(template: &str) -> Result<Vec<&str>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let after = &rest[start + PLACEHOLDER_OPEN.len()..];
        let end = after
            .find('}')
            .ok_or_else(|| "unterminated ${secret:...} placeholder".to_string())?;
        if end == 0 {
            return Err("empty secret name in placeholder".to_string());
        }
        names.push(&after[..end]);
        rest = &after[end + 1..];
    }
    Ok(names)
}
