//! Protocol compatibility normalizer.
//!
//! The Streamable HTTP endpoint refuses requests whose `Accept` header does not
//! list both `application/json` and `text/event-stream`. Many existing clients
//! send `*/*`, `application/json` alone, or nothing at all. This layer
//! overwrites `Accept` on the primary endpoint so those clients keep working.
//! Requests to any other path pass through untouched.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::header::ACCEPT;
use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};

/// The value written into `Accept` on the primary endpoint.
pub const NORMALIZED_ACCEPT: &str = "application/json, text/event-stream";

// ---------------------------------------------------------------------------
// AcceptNormalizerLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AcceptNormalizerLayer {
    path: Arc<str>,
}

impl AcceptNormalizerLayer {
    /// Rewrites `Accept` for requests whose path is `path` (trailing slash ignored).
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: Arc::from(path.trim_end_matches('/')),
        }
    }
}

impl<S> Layer<S> for AcceptNormalizerLayer {
    type Service = AcceptNormalizer<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AcceptNormalizer {
            inner,
            path: Arc::clone(&self.path),
        }
    }
}

// ---------------------------------------------------------------------------
// AcceptNormalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AcceptNormalizer<S> {
    inner: S,
    path: Arc<str>,
}

impl<S, B> Service<Request<B>> for AcceptNormalizer<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.uri().path().trim_end_matches('/') == &*self.path {
            req.headers_mut()
                .insert(ACCEPT, HeaderValue::from_static(NORMALIZED_ACCEPT));
        }
        self.inner.call(req)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
