//! Transport-boundary errors and request outcomes.
//!
//! Handlers return [`RelayError`] for anything that is not a normal reply.
//! Its `IntoResponse` impl renders a JSON body and tags the response with a
//! [`RequestOutcome`] extension, which the fault containment layer reads to
//! decide how to log the request. Disconnects are therefore an explicit value
//! rather than an error type that happens to be caught somewhere.

use std::error::Error as StdError;
use std::io;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::LengthLimitError;
use serde_json::json;

/// Non-standard status used for requests abandoned by the client.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// How a contained request ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestOutcome {
    /// Normal completion, including 4xx replies.
    #[default]
    Completed,
    /// The client went away before the reply could be delivered.
    ClientDisconnected { reason: String },
    /// An unexpected internal failure.
    Faulted { kind: &'static str, message: String },
}

impl RequestOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ClientDisconnected { .. } => "client_disconnected",
            Self::Faulted { .. } => "faulted",
        }
    }
}

/// Errors surfaced at the HTTP transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("client disconnected: {0}")]
    Disconnected(String),
    #[error("{kind}: {message}")]
    Fault { kind: &'static str, message: String },
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("client must accept both application/json and text/event-stream")]
    NotAcceptable,
    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,
    #[error("session not found")]
    SessionNotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("server is shutting down")]
    ShuttingDown,
}

impl RelayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Disconnected(_) => client_closed_request(),
            Self::Fault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code placed in the `error` field of the body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Disconnected(_) => "client_closed_request",
            Self::Fault { .. } => "internal_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::NotAcceptable => "not_acceptable",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::SessionNotFound => "session_not_found",
            Self::BadRequest(_) => "bad_request",
            Self::ShuttingDown => "shutting_down",
        }
    }

    #[must_use]
    pub fn outcome(&self) -> RequestOutcome {
        match self {
            Self::Disconnected(reason) => RequestOutcome::ClientDisconnected {
                reason: reason.clone(),
            },
            Self::Fault { kind, message } => RequestOutcome::Faulted {
                kind: *kind,
                message: message.clone(),
            },
            _ => RequestOutcome::Completed,
        }
    }

    /// Classifies a failed body read: size limit or client disconnect.
    #[must_use]
    pub fn from_body_error(err: &(dyn StdError + 'static), limit: usize) -> Self {
        if chain_contains::<LengthLimitError>(err) {
            Self::PayloadTooLarge { limit }
        } else {
            Self::Disconnected(format!("request body read failed: {err}"))
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        // Fault details go to the log, never to the client.
        let detail = match &self {
            Self::Fault { .. } => "internal server error".to_string(),
            other => other.to_string(),
        };
        let outcome = self.outcome();

        let mut response =
            (self.status(), Json(json!({ "error": self.code(), "detail": detail }))).into_response();
        if matches!(self, Self::ShuttingDown) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
        }
        response.extensions_mut().insert(outcome);
        response
    }
}

/// `499 Client Closed Request`.
#[must_use]
pub fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
}

/// I/O error kinds that mean the peer went away rather than that the server failed.
#[must_use]
pub fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

fn chain_contains<E: StdError + 'static>(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<E>() {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn disconnect_renders_499_and_tags_outcome() {
        let response = RelayError::Disconnected("stream closed".to_string()).into_response();
        assert_eq!(response.status().as_u16(), 499);
        assert_eq!(
            response.extensions().get::<RequestOutcome>(),
            Some(&RequestOutcome::ClientDisconnected {
                reason: "stream closed".to_string()
            })
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "client_closed_request");
    }

    #[tokio::test]
    async fn fault_hides_message_from_client() {
        let response = RelayError::Fault {
            kind: "panic",
            message: "secret internals".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["detail"], "internal server error");
    }

    #[tokio::test]
    async fn client_errors_complete_normally() {
        let response = RelayError::NotAcceptable.into_response();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            response.extensions().get::<RequestOutcome>(),
            Some(&RequestOutcome::Completed)
        );
    }

    #[test]
    fn shutting_down_sets_retry_after() {
        let response = RelayError::ShuttingDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn length_limit_is_payload_too_large() {
        let body = http_body_util::Full::new(bytes::Bytes::from_static(b"abcdef"));
        let err = futures_util::FutureExt::now_or_never(
            http_body_util::Limited::new(body, 2).collect(),
        )
        .unwrap()
        .unwrap_err();
        assert!(matches!(
            RelayError::from_body_error(&*err, 2),
            RelayError::PayloadTooLarge { limit: 2 }
        ));
    }

    #[test]
    fn other_body_errors_are_disconnects() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(matches!(
            RelayError::from_body_error(&err, 10),
            RelayError::Disconnected(_)
        ));
    }

    #[test]
    fn disconnect_kinds() {
        assert!(is_disconnect(io::ErrorKind::BrokenPipe));
        assert!(is_disconnect(io::ErrorKind::ConnectionReset));
        assert!(!is_disconnect(io::ErrorKind::PermissionDenied));
    }
}
