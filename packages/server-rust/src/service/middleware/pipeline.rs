//! Pipeline composition: wraps a provider in the call middleware stack.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use relay_core::GenerationRequest;
use tower::{Service, ServiceBuilder};

use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServiceConfig;
use crate::traits::{Completion, GenerationProvider, ProviderError};

// ---------------------------------------------------------------------------
// ProviderService
// ---------------------------------------------------------------------------

/// Adapts a [`GenerationProvider`] trait object into a tower `Service`.
#[derive(Clone)]
pub struct ProviderService {
    provider: Arc<dyn GenerationProvider>,
}

impl ProviderService {
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }
}

impl Service<GenerationRequest> for ProviderService {
    type Response = Completion;
    type Error = ProviderError;
    type Future = Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: GenerationRequest) -> Self::Future {
        let provider = Arc::clone(&self.provider);
        Box::pin(async move { provider.complete(&request).await })
    }
}

/// The composed provider call stack. Cheap to clone; clone once per call.
pub type ProviderPipeline = MetricsService<TimeoutService<ProviderService>>;

/// Build the provider pipeline by wrapping the provider with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome, including timeouts
/// 2. `TimeoutLayer` -- enforce the provider deadline
#[must_use]
pub fn build_provider_pipeline(
    provider: Arc<dyn GenerationProvider>,
    config: &ServiceConfig,
) -> ProviderPipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer::new(provider.name()))
        .layer(TimeoutLayer::new(config.provider_timeout_ms))
        .service(ProviderService::new(provider))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
