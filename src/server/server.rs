//! Web server: REST API, control WebSocket and static HLS files

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::device::DeviceApi;
use crate::error::{ConfigError, Result};
use crate::server::{handlers, websocket};
use crate::session::SessionRegistry;

/// Shared state handed to every handler
pub struct AppState {
    pub api: Arc<dyn DeviceApi>,
    pub config: Arc<AppConfig>,
    pub registry: SessionRegistry,
    pub started_at: Instant,
    /// Cancelled when the server shuts down; every connection closes on it
    pub shutdown: CancellationToken,
    /// Upgraded WebSocket connections, which outlive their HTTP request
    pub sessions: TaskTracker,
}

impl AppState {
    pub fn new(api: Arc<dyn DeviceApi>, config: Arc<AppConfig>) -> Self {
        Self {
            api,
            config,
            registry: SessionRegistry::new(),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }
}

/// Web server
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(api: Arc<dyn DeviceApi>, config: Arc<AppConfig>) -> Self {
        Self {
            state: Arc::new(AppState::new(api, config)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let streams = ServeDir::new(&config.relay.output_dir);
        let public = ServeDir::new(&config.server.static_dir);

        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/devices", get(handlers::get_devices))
            .route("/api/snapshot/:device_id", get(handlers::get_snapshot))
            .route("/api/sessions", get(handlers::get_sessions))
            .route("/ws", get(websocket::ws_handler))
            .nest_service(&config.server.streams_url_prefix, streams)
            .fallback_service(public)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Close every connection and wait until each has torn down its relay
    pub async fn close_sessions(&self) {
        self.state.shutdown.cancel();
        self.state.sessions.close();
        self.state.sessions.wait().await;
        info!("All sessions closed");
    }

    /// Serve until `shutdown` resolves, then close every session
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = &self.state.config.server;
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Web server listening on http://{}", addr);

        let token = self.state.shutdown.clone();
        let signal = async move {
            shutdown.await;
            token.cancel();
        };

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await;

        self.close_sessions().await;
        served?;
        Ok(())
    }
}
