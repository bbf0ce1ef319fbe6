//! Backend groups.
//!
//! # Responsibilities
//! - Collect configured backends into named groups of replicas
//! - Apply the group's load balancing strategy

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{BackendConfig, ConfigError};
use crate::load_balancer::{round_robin::RoundRobin, LoadBalancer};
use crate::upstream::BackendRef;

/// A named set of equivalent replicas.
#[derive(Debug)]
pub struct BackendGroup {
    pub name: String,
    backends: Vec<Arc<BackendRef>>,
    lb: Box<dyn LoadBalancer>,
}

impl BackendGroup {
    pub fn new(name: impl Into<String>, backends: Vec<Arc<BackendRef>>) -> Self {
        Self {
            name: name.into(),
            backends,
            lb: Box::new(RoundRobin::new()),
        }
    }

    /// Build every group declared in the backend list, in declaration order.
    pub fn from_configs(
        configs: &[BackendConfig],
    ) -> Result<HashMap<String, Arc<BackendGroup>>, ConfigError> {
        let mut grouped: Vec<(String, Vec<Arc<BackendRef>>)> = Vec::new();
        for config in configs {
            let backend = Arc::new(BackendRef::from_config(config)?);
            match grouped.iter_mut().find(|(name, _)| *name == config.group) {
                Some((_, members)) => members.push(backend),
                None => grouped.push((config.group.clone(), vec![backend])),
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(name, backends)| {
                let group = Arc::new(BackendGroup::new(name.clone(), backends));
                (name, group)
            })
            .collect())
    }

    /// Pick a replica for a request with no session binding.
    pub fn select(&self) -> Option<Arc<BackendRef>> {
        let backend = self.lb.next_server(&self.backends);
        if backend.is_none() {
            tracing::debug!(group = %self.name, "Backend group is empty");
        }
        backend
    }

    pub fn backends(&self) -> &[Arc<BackendRef>] {
        &self.backends
    }

    /// Whether a replica with the same name and endpoint is still a member.
    pub fn contains(&self, backend: &BackendRef) -> bool {
        let key = backend.pool_key();
        self.backends
            .iter()
            .any(|member| member.name == backend.name && member.pool_key() == key)
    }
}
