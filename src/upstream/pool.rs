//! Idle connection pool keyed by `(host, port, sni)`.
//!
//! # Design Decisions
//! - HTTP/1.1 senders carry one exchange at a time, so a sender only returns
//!   to the pool once its response body has been read to the end
//! - Closed or aged-out senders are discarded on checkout
//! - A pooled sender that fails its readiness check is dropped and a fresh
//!   connection is opened; nothing has been written to it at that point
//! - [`ConnectionPool::clear`] starts a new pool generation. Connections
//!   checked out before it are closed on checkin instead of pooled, so TLS
//!   settings from an older config never outlive a reload

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::Body;
use dashmap::DashMap;
use hyper::client::conn::http1::SendRequest;

use crate::config::PoolConfig;
use crate::upstream::backend::{BackendRef, PoolKey};
use crate::upstream::connector::{connect, ConnectError, ConnectTimeouts};

#[derive(Debug)]
struct IdleSender {
    sender: SendRequest<Body>,
    idle_since: Instant,
}

/// A connection checked out of the pool.
#[derive(Debug)]
pub struct PooledConnection {
    pub key: PoolKey,
    pub sender: SendRequest<Body>,
    /// True when taken from the idle list rather than freshly opened.
    pub reused: bool,
    generation: u64,
}

/// Per-key idle connection lists.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: DashMap<PoolKey, Vec<IdleSender>>,
    max_idle_per_key: usize,
    idle_timeout: Duration,
    generation: AtomicU64,
}

impl ConnectionPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            idle: DashMap::new(),
            max_idle_per_key: config.max_idle_per_backend,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            generation: AtomicU64::new(0),
        }
    }

    /// Take a ready idle connection for `backend`, or open a new one.
    pub async fn checkout(
        &self,
        backend: &BackendRef,
        timeouts: &ConnectTimeouts,
    ) -> Result<PooledConnection, ConnectError> {
        let key = backend.pool_key();
        let generation = self.generation.load(Ordering::Acquire);

        while let Some(mut sender) = self.take_idle(&key) {
            match sender.ready().await {
                Ok(()) => {
                    tracing::trace!(key = %key, "Reusing pooled connection");
                    return Ok(PooledConnection {
                        key,
                        sender,
                        reused: true,
                        generation,
                    });
                }
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Discarding stale pooled connection");
                }
            }
        }

        let sender = connect(backend, timeouts).await?;
        tracing::debug!(key = %key, backend = %backend.name, "Opened upstream connection");
        Ok(PooledConnection {
            key,
            sender,
            reused: false,
            generation,
        })
    }

    /// Return a connection whose last exchange completed.
    pub fn checkin(&self, conn: PooledConnection) {
        if conn.sender.is_closed() || conn.generation != self.generation.load(Ordering::Acquire) {
            return;
        }
        let mut entry = self.idle.entry(conn.key).or_default();
        if entry.len() >= self.max_idle_per_key {
            return;
        }
        entry.push(IdleSender {
            sender: conn.sender,
            idle_since: Instant::now(),
        });
    }

    fn take_idle(&self, key: &PoolKey) -> Option<SendRequest<Body>> {
        let mut entry = self.idle.get_mut(key)?;
        let timeout = self.idle_timeout;
        entry.retain(|idle| !idle.sender.is_closed() && idle.idle_since.elapsed() < timeout);
        // Most recently returned first
        entry.pop().map(|idle| idle.sender)
    }

    /// Idle connections currently held for `key`.
    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.idle.get(key).map(|list| list.len()).unwrap_or(0)
    }

    /// Idle connections across all keys.
    pub fn total_idle(&self) -> usize {
        self.idle.iter().map(|entry| entry.value().len()).sum()
    }

    /// Close every idle connection and refuse checkins of older ones.
    pub fn clear(&self) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = self.total_idle();
        self.idle.clear();
        dropped
    }
}
