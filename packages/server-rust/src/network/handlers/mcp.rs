//! Stateless Streamable HTTP endpoint.
//!
//! Each `POST` carries one JSON-RPC message or batch and gets its reply in the
//! same response. No session is created, so `GET` and `DELETE` are answered
//! `405` by the router.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::{read_body, AppState};
use crate::network::error::RelayError;

const JSON_MEDIA_TYPE: &str = "application/json";
const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Handles `POST /mcp`.
///
/// # Errors
///
/// - `406` unless `Accept` lists both JSON and event-stream media types
/// - `415` unless the body is declared as JSON
/// - `413` if the body exceeds the configured limit
/// - `499` if the client goes away while the body is being read
pub async fn mcp_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, RelayError> {
    if !accepts_json_and_event_stream(&headers) {
        return Err(RelayError::NotAcceptable);
    }
    if !is_json_content(&headers) {
        return Err(RelayError::UnsupportedMediaType);
    }

    let bytes = read_body(body, state.config.max_body_bytes).await?;
    let reply = state.dispatcher.dispatch(&bytes).await;

    let Some(json) = reply.to_json() else {
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    if state.config.json_response {
        Ok(([(CONTENT_TYPE, JSON_MEDIA_TYPE)], json).into_response())
    } else {
        Ok((
            [
                (CONTENT_TYPE, EVENT_STREAM_MEDIA_TYPE),
                (CACHE_CONTROL, "no-cache"),
            ],
            format!("event: message\ndata: {json}\n\n"),
        )
            .into_response())
    }
}

/// Whether every `Accept` value taken together lists both required media types.
fn accepts_json_and_event_stream(headers: &HeaderMap) -> bool {
    let mut json = false;
    let mut event_stream = false;
    for value in headers.get_all(ACCEPT) {
        let Ok(value) = value.to_str() else { continue };
        for media in value.split(',') {
            let media = media.split(';').next().unwrap_or_default().trim();
            json |= media.eq_ignore_ascii_case(JSON_MEDIA_TYPE);
            event_stream |= media.eq_ignore_ascii_case(EVENT_STREAM_MEDIA_TYPE);
        }
    }
    json && event_stream
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}
