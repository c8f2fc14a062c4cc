//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Binding separately lets the caller log the real port before
//! traffic arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TransportMode};
use super::error::is_disconnect;
use super::handlers::{
    health_handler, mcp_post_handler, messages_handler, root_handler, sse_handler, AppState,
};
use super::middleware::{build_http_layers, build_request_pipeline};
use super::sessions::SessionRegistry;
use super::shutdown::ShutdownController;
use crate::auth::{Authenticator, HEALTH_PATH, ROOT_PATH};
use crate::service::McpDispatcher;

/// Manages the HTTP server lifecycle for the network transports.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (session registry, shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    dispatcher: Arc<McpDispatcher>,
    authenticator: Arc<Authenticator>,
    sessions: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        dispatcher: Arc<McpDispatcher>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        Self {
            config,
            listener: None,
            dispatcher,
            authenticator,
            sessions: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- health JSON, outside the request pipeline
    /// - `GET /` -- service description
    /// - streamable HTTP: `POST /mcp`
    /// - SSE: `GET /sse` and `POST /messages/`
    ///
    /// Everything except `/health` runs through [`build_request_pipeline`],
    /// and every route runs through [`build_http_layers`].
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            sessions: Arc::clone(&self.sessions),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: self.start_time,
        };
        let endpoints = &self.config.endpoints;

        let mut guarded = Router::new().route(ROOT_PATH, get(root_handler));
        match self.config.transport {
            TransportMode::StreamableHttp => {
                guarded = guarded.route(&endpoints.mcp_path, post(mcp_post_handler));
            }
            TransportMode::Sse => {
                guarded = guarded
                    .route(&endpoints.sse_path, get(sse_handler))
                    .route(&endpoints.messages_path, post(messages_handler));
                // Accept the messages path with and without its trailing slash.
                let bare = endpoints.messages_path.trim_end_matches('/');
                if !bare.is_empty() && bare != endpoints.messages_path {
                    guarded = guarded.route(bare, post(messages_handler));
                }
            }
            TransportMode::Stdio => {}
        }

        let guarded = guarded.layer(build_request_pipeline(
            &self.config,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.authenticator),
        ));

        Router::new()
            .route(HEALTH_PATH, get(health_handler))
            .merge(guarded)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `signal` resolves, then drains.
    ///
    /// After the signal:
    /// 1. Health state transitions to Draining and new requests get `503`
    /// 2. Every SSE session is sent `Close`
    /// 3. axum stops accepting and finishes open connections
    /// 4. Waits up to `drain_timeout` for in-flight requests
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or if the server
    /// hits a fatal I/O error. Peer-disconnect errors are logged and ignored.
    pub async fn serve(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let shutdown_ctrl = self.shutdown;
        let sessions = self.sessions;
        let config = self.config;

        let graceful = {
            let shutdown_ctrl = Arc::clone(&shutdown_ctrl);
            async move {
                signal.await;
                info!("shutdown signal received; draining");
                shutdown_ctrl.trigger_shutdown();
                let closed = sessions.close_all();
                if closed > 0 {
                    info!(sessions = closed, "closed sse sessions");
                }
            }
        };

        // Transition to Ready so /health reports it.
        shutdown_ctrl.set_ready();
        info!(transport = %config.transport, "serving MCP over HTTP");

        match axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
        {
            Ok(()) => {}
            Err(e) if is_disconnect(e.kind()) => {
                info!(error = %e, "listener stopped after peer disconnect");
            }
            Err(e) => return Err(e.into()),
        }

        if shutdown_ctrl.wait_for_drain(config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "drain timeout expired with requests still in flight"
            );
        }
        Ok(())
    }
}
