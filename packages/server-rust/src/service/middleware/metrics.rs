//! Metrics middleware for provider calls.
//!
//! Records call duration and outcome using `tracing` spans rather than a
//! metrics crate.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use relay_core::GenerationRequest;
use tower::{Layer, Service};
use tracing::{debug_span, Instrument};

use crate::traits::{Completion, ProviderError};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments provider calls with timing via `tracing` spans.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer {
    provider: &'static str,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            provider: self.provider,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    provider: &'static str,
}

impl<S> Service<GenerationRequest> for MetricsService<S>
where
    S: Service<GenerationRequest, Response = Completion, Error = ProviderError> + Send,
    S::Future: Send + 'static,
{
    type Response = Completion;
    type Error = ProviderError;
    type Future = Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: GenerationRequest) -> Self::Future {
        let provider = self.provider;
        let span = debug_span!(
            "provider_call",
            provider = provider,
            model = %request.model,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(ProviderError::Timeout { .. }) => "timeout",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::debug!(
                    provider = provider,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "provider call complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
