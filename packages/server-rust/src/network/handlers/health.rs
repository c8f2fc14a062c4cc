//! Health endpoint handler.
//!
//! Mounted outside the request pipeline: no auth, no containment, and it keeps
//! answering while the server drains.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the server is actually accepting work. This lets monitoring tools
/// distinguish between "server is up but draining" vs "server is down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "sessions": state.sessions.count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
