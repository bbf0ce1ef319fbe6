//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the proxy handler as fallback
//! - Wire up middleware (request id, tracing, global concurrency limit)
//! - Bind to the listener, plain or TLS
//! - Apply config reloads by swapping the compiled runtime
//! - Run the session sweeper and the admin API alongside
//! - Stop everything on the shutdown broadcast

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ProxyConfig};
use crate::http::forwarder::{ClientInfo, Forwarder};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::state::Runtime;
use crate::session::SessionTracker;
use crate::upstream::ConnectionPool;

/// How long in-flight requests get to finish after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ArcSwap<Runtime>>,
    pub forwarder: Forwarder,
    pub started: Instant,
    /// Scheme clients use to reach the gateway.
    pub scheme: &'static str,
}

impl AppState {
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let runtime = Runtime::compile(config, 0)?;
        let pool = Arc::new(ConnectionPool::new(&config.pool));
        let sessions = Arc::new(SessionTracker::new(&config.sessions));

        Ok(Self {
            runtime: Arc::new(ArcSwap::from_pointee(runtime)),
            forwarder: Forwarder::new(pool, sessions),
            started: Instant::now(),
            scheme: if config.listener.tls.is_some() {
                "https"
            } else {
                "http"
            },
        })
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        self.forwarder.sessions()
    }

    /// Compile `config` and publish it. The current runtime stays on error.
    ///
    /// Pooled connections were opened with the previous backend TLS settings
    /// and are closed.
    pub fn reload(&self, config: &ProxyConfig) -> Result<u64, ConfigError> {
        let generation = self.runtime.load().generation + 1;
        let runtime = Runtime::compile(config, generation)?;
        self.runtime.store(Arc::new(runtime));
        let closed = self.forwarder.pool().clear();
        tracing::debug!(generation, closed, "Closed pooled upstream connections");
        Ok(generation)
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let state = AppState::new(&config)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id(request.headers()),
                    )
                }),
            )
            .layer(set_request_id_layer())
            .layer(GlobalConcurrencyLimitLayer::new(
                config.listener.max_concurrent_requests,
            ))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            scheme = self.state.scheme,
            routes = self.state.runtime.load().routes.len(),
            "HTTP server starting"
        );

        // Config reloads
        let reload_state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match reload_state.reload(&config) {
                    Ok(generation) => tracing::info!(
                        generation,
                        routes = config.routes.len(),
                        backends = config.backends.len(),
                        "Configuration reloaded"
                    ),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Reload rejected; keeping current configuration"
                    ),
                }
            }
        });

        // Session eviction
        let sweep_interval = Duration::from_secs(self.config.sessions.sweep_interval_secs);
        tokio::spawn(
            self.state
                .sessions()
                .clone()
                .run_sweeper(sweep_interval, shutdown.resubscribe()),
        );

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_app =
                crate::admin::setup_admin_router(self.state.clone(), &self.config.admin.api_key);
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            tokio::spawn(async move {
                let result = axum::serve(admin_listener, admin_app)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls_config = crate::net::tls::load_tls_config(
                    std::path::Path::new(&tls.cert_path),
                    std::path::Path::new(&tls.key_path),
                )
                .await?;

                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                        tracing::info!("Shutdown signal received");
                    })
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let runtime = state.runtime.load_full();
    let client = ClientInfo {
        addr,
        scheme: state.scheme,
        request_id: request_id(request.headers()),
    };
    state.forwarder.forward(&runtime, client, request).await
}
