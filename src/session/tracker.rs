//! MCP session table.
//!
//! # States
//! ```text
//! Uninitialized ──(initialize succeeds)──► Active ──(DELETE / admin / idle)──► Terminated
//!  PendingSession                          McpSession in the table             removed
//! ```
//!
//! # Design Decisions
//! - `DashMap` entry API makes creation atomic per session id
//! - Every request on a session holds a [`SessionGuard`] until its response
//!   body ends; a session with a live guard is never evicted
//! - Expiry is checked lazily on lookup and by a periodic sweep

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::{ReinitPolicy, SessionConfig};
use crate::observability::metrics;
use crate::upstream::BackendRef;

/// Session lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uninitialized = 0,
    Active = 1,
    Terminated = 2,
}

impl From<u8> for SessionState {
    fn from(val: u8) -> Self {
        match val {
            1 => SessionState::Active,
            2 => SessionState::Terminated,
            _ => SessionState::Uninitialized,
        }
    }
}

/// A session bound to one backend replica.
#[derive(Debug)]
pub struct McpSession {
    pub id: String,
    pub backend: Arc<BackendRef>,
    /// Route the session was initialized on.
    pub route: String,
    /// The upstream returned no id; the gateway minted this one.
    pub assigned_by_gateway: bool,
    created_at: Instant,
    epoch: Instant,
    /// Milliseconds since `epoch`.
    last_seen_ms: AtomicU64,
    state: AtomicU8,
    in_flight: AtomicUsize,
}

impl McpSession {
    fn new(
        id: String,
        backend: Arc<BackendRef>,
        route: String,
        assigned_by_gateway: bool,
        epoch: Instant,
    ) -> Self {
        let session = Self {
            id,
            backend,
            route,
            assigned_by_gateway,
            created_at: Instant::now(),
            epoch,
            last_seen_ms: AtomicU64::new(0),
            state: AtomicU8::new(SessionState::Active as u8),
            in_flight: AtomicUsize::new(0),
        };
        session.touch();
        session
    }

    fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(now, Ordering::Relaxed);
    }

    /// Register a request on this session.
    pub fn enter(self: &Arc<Self>) -> SessionGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.touch();
        SessionGuard {
            session: self.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.load(Ordering::Acquire).into()
    }

    fn mark_terminated(&self) {
        self.state
            .store(SessionState::Terminated as u8, Ordering::Release);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Time since the last request started or finished.
    pub fn idle_for(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last_seen)
    }

    fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.in_flight() == 0 && self.idle_for() > idle_timeout
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            backend: self.backend.name.clone(),
            route: self.route.clone(),
            state: self.state(),
            in_flight: self.in_flight(),
            age_secs: self.created_at.elapsed().as_secs(),
            idle_secs: self.idle_for().as_secs(),
            assigned_by_gateway: self.assigned_by_gateway,
        }
    }
}

/// Admin-facing snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub backend: String,
    pub route: String,
    pub state: SessionState,
    pub in_flight: usize,
    pub age_secs: u64,
    pub idle_secs: u64,
    pub assigned_by_gateway: bool,
}

/// Marks a request in flight on a session. Dropping it refreshes `lastSeenAt`.
#[derive(Debug)]
pub struct SessionGuard {
    session: Arc<McpSession>,
}

impl SessionGuard {
    pub fn session(&self) -> &Arc<McpSession> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.touch();
        self.session.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An `initialize` exchange in progress.
#[derive(Debug, Clone)]
pub struct PendingSession {
    pub backend: Arc<BackendRef>,
    pub route: String,
    /// Id the client re-sent with a replayed `initialize`.
    pub existing_id: Option<String>,
}

/// Concurrent table of active sessions.
#[derive(Debug)]
pub struct SessionTracker {
    sessions: DashMap<String, Arc<McpSession>>,
    idle_timeout: Duration,
    policy: ReinitPolicy,
    epoch: Instant,
}

impl SessionTracker {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            policy: config.on_reinitialize,
            epoch: Instant::now(),
        }
    }

    pub fn policy(&self) -> ReinitPolicy {
        self.policy
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Find an active session and register a request on it.
    ///
    /// A session idle past the timeout is evicted here and `None` returned.
    pub fn lookup(&self, id: &str) -> Option<SessionGuard> {
        {
            let session = self.sessions.get(id)?;
            if !session.is_expired(self.idle_timeout) {
                return Some(session.value().enter());
            }
        }

        if let Some((_, session)) = self
            .sessions
            .remove_if(id, |_, s| s.is_expired(self.idle_timeout))
        {
            session.mark_terminated();
            metrics::record_session_event("expired");
            metrics::set_sessions_active(self.sessions.len());
            tracing::info!(session_id = %id, backend = %session.backend.name, "Session expired");
        }
        None
    }

    /// Snapshot of a session without registering a request.
    pub fn get(&self, id: &str) -> Option<Arc<McpSession>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Start an `initialize` exchange against `backend`.
    pub fn begin(
        &self,
        backend: Arc<BackendRef>,
        route: &str,
        existing_id: Option<String>,
    ) -> PendingSession {
        PendingSession {
            backend,
            route: route.to_string(),
            existing_id,
        }
    }

    /// Record a successful `initialize`.
    ///
    /// The id comes from the upstream's `Mcp-Session-Id`; without one the
    /// re-sent id is kept, or a fresh UUID is assigned.
    pub fn activate(&self, pending: PendingSession, upstream_id: Option<&str>) -> Arc<McpSession> {
        let (id, assigned_by_gateway) = match (upstream_id, &pending.existing_id) {
            (Some(id), _) => (id.to_string(), false),
            (None, Some(existing)) => {
                let assigned = self
                    .get(existing)
                    .map(|s| s.assigned_by_gateway)
                    .unwrap_or(true);
                (existing.clone(), assigned)
            }
            (None, None) => (uuid::Uuid::new_v4().to_string(), true),
        };

        let session = match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry)
                if self.policy == ReinitPolicy::Reuse
                    && entry.get().backend.pool_key() == pending.backend.pool_key() =>
            {
                metrics::record_session_event("reused");
                entry.get().touch();
                entry.get().clone()
            }
            Entry::Occupied(mut entry) => {
                let session = Arc::new(McpSession::new(
                    id.clone(),
                    pending.backend,
                    pending.route,
                    assigned_by_gateway,
                    self.epoch,
                ));
                let previous = entry.insert(session.clone());
                previous.mark_terminated();
                metrics::record_session_event("created");
                session
            }
            Entry::Vacant(entry) => {
                let session = Arc::new(McpSession::new(
                    id.clone(),
                    pending.backend,
                    pending.route,
                    assigned_by_gateway,
                    self.epoch,
                ));
                entry.insert(session.clone());
                metrics::record_session_event("created");
                session
            }
        };

        metrics::set_sessions_active(self.sessions.len());
        tracing::info!(
            session_id = %session.id,
            backend = %session.backend.name,
            route = %session.route,
            assigned_by_gateway = session.assigned_by_gateway,
            "Session active"
        );
        session
    }

    /// Remove a session. Requests already in flight finish normally.
    pub fn terminate(&self, id: &str) -> Option<Arc<McpSession>> {
        let (_, session) = self.sessions.remove(id)?;
        session.mark_terminated();
        metrics::record_session_event("terminated");
        metrics::set_sessions_active(self.sessions.len());
        tracing::info!(session_id = %id, backend = %session.backend.name, "Session terminated");
        Some(session)
    }

    /// Evict every idle session with no request in flight.
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|id, session| {
            if session.is_expired(self.idle_timeout) {
                session.mark_terminated();
                tracing::info!(session_id = %id, backend = %session.backend.name, "Session expired");
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            for _ in 0..evicted {
                metrics::record_session_event("expired");
            }
            metrics::set_sessions_active(self.sessions.len());
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.value().info()).collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Periodically evict idle sessions until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_idle();
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.len(), "Session sweep");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Session sweeper stopping");
                    break;
                }
            }
        }
    }
}
