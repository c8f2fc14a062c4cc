//! Fault containment.
//!
//! Guarantees that no single request can take the process down or leak an
//! internal error to the client:
//!
//! - handler panics are caught and turned into a generic `500` JSON body
//! - the [`RequestOutcome`] a handler attached to its response decides how the
//!   request is logged (client disconnects at `info`, faults at `error`)
//! - while the server drains, new requests get `503` instead of starting work
//! - each admitted request holds an [`InFlightGuard`](crate::network::InFlightGuard)
//!   until its response is produced

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::{error, info};

use crate::network::error::{RelayError, RequestOutcome};
use crate::network::shutdown::ShutdownController;

// ---------------------------------------------------------------------------
// FaultContainmentLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FaultContainmentLayer {
    shutdown: Arc<ShutdownController>,
}

impl FaultContainmentLayer {
    #[must_use]
    pub fn new(shutdown: Arc<ShutdownController>) -> Self {
        Self { shutdown }
    }
}

impl<S> Layer<S> for FaultContainmentLayer {
    type Service = FaultContainment<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FaultContainment {
            inner,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

// ---------------------------------------------------------------------------
// FaultContainment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FaultContainment<S> {
    inner: S,
    shutdown: Arc<ShutdownController>,
}

impl<S> Service<Request<Body>> for FaultContainment<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if !self.shutdown.is_accepting() {
            return Box::pin(async { Ok(RelayError::ShuttingDown.into_response()) });
        }

        let guard = self.shutdown.in_flight_guard();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let _guard = guard;
            let handled = AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await;

            let response = match handled {
                Ok(Ok(response)) => response,
                Ok(Err(never)) => match never {},
                Err(panic) => RelayError::Fault {
                    kind: "panic",
                    message: panic_message(panic.as_ref()),
                }
                .into_response(),
            };

            match response.extensions().get::<RequestOutcome>() {
                None | Some(RequestOutcome::Completed) => {}
                Some(RequestOutcome::ClientDisconnected { reason }) => {
                    info!(%method, path = %path, reason = %reason, "client disconnected");
                }
                Some(RequestOutcome::Faulted { kind, message }) => {
                    error!(%method, path = %path, kind = kind, message = %message, "request faulted");
                }
            }

            Ok(response)
        })
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
