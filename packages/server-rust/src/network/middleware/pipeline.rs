//! Request pipeline for the guarded MCP routes.
//!
//! Ordering (outermost to innermost):
//! 1. `AcceptNormalizer` -- fixes `Accept` on the primary endpoint
//! 2. `FaultContainment` -- panics, disconnects, drain refusal
//! 3. `Auth` -- credential check
//!
//! Containment sits outside auth so that a rejected request still counts as
//! in flight and is refused while draining. `/health` is mounted outside this
//! pipeline entirely.

use std::sync::Arc;

use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;

use super::accept::AcceptNormalizerLayer;
use super::auth::AuthLayer;
use super::containment::FaultContainmentLayer;
use crate::auth::Authenticator;
use crate::network::config::NetworkConfig;
use crate::network::shutdown::ShutdownController;

/// The composed Tower layer type produced by [`build_request_pipeline`].
pub type RequestPipeline =
    Stack<AuthLayer, Stack<FaultContainmentLayer, Stack<AcceptNormalizerLayer, Identity>>>;

#[must_use]
pub fn build_request_pipeline(
    config: &NetworkConfig,
    shutdown: Arc<ShutdownController>,
    authenticator: Arc<Authenticator>,
) -> RequestPipeline {
    ServiceBuilder::new()
        .layer(AcceptNormalizerLayer::new(&config.endpoints.mcp_path))
        .layer(FaultContainmentLayer::new(shutdown))
        .layer(AuthLayer::new(authenticator))
        .into_inner()
}
