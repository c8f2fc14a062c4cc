//! HTTP handler definitions for the relay.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod mcp;
pub mod root;
pub mod sse;

pub use health::health_handler;
pub use mcp::mcp_post_handler;
pub use root::root_handler;
pub use sse::{messages_handler, sse_handler};

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use bytes::Bytes;

use super::error::RelayError;
use super::{NetworkConfig, SessionRegistry, ShutdownController};
use crate::service::McpDispatcher;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// JSON-RPC dispatcher shared by every transport.
    pub dispatcher: Arc<McpDispatcher>,
    /// Open legacy SSE sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

/// Reads a request body, classifying failures as oversize or disconnect.
pub(crate) async fn read_body(body: Body, limit: usize) -> Result<Bytes, RelayError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| RelayError::from_body_error(&e, limit))
}
