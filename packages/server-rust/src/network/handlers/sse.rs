//! Legacy SSE transport.
//!
//! `GET /sse` opens a long-lived event stream whose first event names the
//! endpoint to POST messages to. Replies to those POSTs travel back over the
//! stream, so the POST itself only answers `202`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::info;

use super::{read_body, AppState};
use crate::network::error::RelayError;
use crate::network::sessions::{OutboundMessage, SendError, SessionGuard, SessionId};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    session_id: Option<String>,
}

/// Handles `GET /sse`: registers a session and streams its replies.
///
/// The session is removed from the registry when the stream is dropped,
/// whether the client hung up or the server closed it.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (handle, rx) = state.sessions.register(&state.config.sessions);
    let guard = SessionGuard::new(Arc::clone(&state.sessions), handle.id);
    info!(session_id = %handle.id, "sse session opened");

    let endpoint = format!(
        "{}?session_id={}",
        state.config.endpoints.messages_path, handle.id
    );
    let announce = stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) });

    let replies = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        match rx.recv().await {
            Some(OutboundMessage::Event(json)) => Some((
                Ok(Event::default().event("message").data(json)),
                (rx, guard),
            )),
            Some(OutboundMessage::Close) | None => None,
        }
    });

    Sse::new(announce.chain(replies))
        .keep_alive(KeepAlive::new().interval(state.config.sessions.keep_alive_interval))
}

/// Handles `POST /messages/?session_id=...`.
///
/// # Errors
///
/// - `400` if `session_id` is missing or malformed
/// - `404` if no such session is open
/// - `499` if the session's stream has gone away or stays full past the send timeout
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: Body,
) -> Result<Response, RelayError> {
    let raw = query
        .session_id
        .ok_or_else(|| RelayError::BadRequest("session_id is required".to_string()))?;
    let id: SessionId = raw
        .parse()
        .map_err(|_| RelayError::BadRequest("invalid session_id".to_string()))?;
    let handle = state.sessions.get(id).ok_or(RelayError::SessionNotFound)?;

    if !handle.is_connected() {
        return Err(RelayError::Disconnected(format!("sse session {id} closed")));
    }

    let bytes = read_body(body, state.config.max_body_bytes).await?;
    let reply = state.dispatcher.dispatch(&bytes).await;

    if let Some(json) = reply.to_json() {
        handle
            .send_timeout(OutboundMessage::Event(json), state.config.sessions.send_timeout)
            .await
            .map_err(|e| match e {
                SendError::Disconnected => {
                    RelayError::Disconnected(format!("sse session {id} closed"))
                }
                SendError::Timeout => {
                    RelayError::Disconnected(format!("sse session {id} stopped reading"))
                }
            })?;
    }

    Ok(StatusCode::ACCEPTED.into_response())
}
