//! Service description at `/`.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

pub async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let info = state.dispatcher.server_info();
    let endpoints = &state.config.endpoints;
    Json(json!({
        "name": info.name,
        "version": info.version,
        "transport": state.config.transport.as_str(),
        "endpoints": {
            "mcp": endpoints.mcp_path,
            "sse": endpoints.sse_path,
            "messages": endpoints.messages_path,
            "health": crate::auth::HEALTH_PATH,
        },
    }))
}
