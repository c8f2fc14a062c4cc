//! Timeout middleware for provider calls.
//!
//! Rejects calls that exceed the configured deadline with `ProviderError::Timeout`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use relay_core::GenerationRequest;
use tower::{Layer, Service};

use crate::traits::{Completion, ProviderError};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds every provider call by a fixed deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout_ms: self.timeout_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces the provider deadline.
///
/// The inner future is dropped on expiry, which cancels the in-flight HTTP
/// request.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout_ms: u64,
}

impl<S> Service<GenerationRequest> for TimeoutService<S>
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
        let timeout_ms = self.timeout_ms;
        let fut = self.inner.call(request);
        Box::pin(async move {
            let duration = Duration::from_millis(timeout_ms);
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ProviderError::Timeout { timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use relay_core::{GenerateArguments, GenerationDefaults};
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<GenerationRequest> for SlowService {
        type Response = Completion;
        type Error = ProviderError;
        type Future = Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: GenerationRequest) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Completion {
                    text: request.prompt,
                    finish_reason: None,
                    provider_model: None,
                    usage: None,
                })
            })
        }
    }

    fn make_request() -> GenerationRequest {
        GenerationRequest::validate(
            GenerateArguments {
                prompt: Some("hello".to_string()),
                ..GenerateArguments::default()
            },
            &GenerationDefaults::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer::new(1000).layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(make_request()).await.unwrap();
        assert_eq!(resp.text, "hello");
    }

    #[tokio::test]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer::new(50).layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(make_request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout { timeout_ms: 50 });
    }
}
