//! JSON-RPC method routing for the MCP server surface.
//!
//! Transport-agnostic: the HTTP, SSE, and stdio transports all hand raw
//! payload bytes to [`McpDispatcher::dispatch`] and write back whatever
//! [`DispatchReply`] it produces.

use futures_util::future::join_all;
use relay_core::jsonrpc::{error_codes, parse_payload, Payload, JSONRPC_VERSION};
use relay_core::mcp::{
    methods, negotiate_protocol_version, InitializeParams, InitializeResult, ListToolsResult,
    ServerCapabilities, ToolsCapability,
};
use relay_core::{
    CallToolParams, CallToolResult, Implementation, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::config::ServiceConfig;
use super::generate::GenerateTool;

/// What a transport should send back for one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReply {
    /// Only notifications or client responses were received.
    Nothing,
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl DispatchReply {
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Serialized reply body, or `None` if there is nothing to send.
    ///
    /// A response that cannot be serialized is replaced by an internal error
    /// carrying the same id, so the client always gets an answer.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        match self {
            Self::Nothing => None,
            Self::Single(response) => {
                Some(encode_or_internal(response, response.id.as_ref()).to_string())
            }
            Self::Batch(responses) => Some(
                Value::Array(
                    responses
                        .iter()
                        .map(|r| encode_or_internal(r, r.id.as_ref()))
                        .collect(),
                )
                .to_string(),
            ),
        }
    }
}

/// JSON form of `body`, or a `-32603` reply for `id` when it cannot be serialized.
fn encode_or_internal<T: Serialize>(body: &T, id: Option<&RequestId>) -> Value {
    serde_json::to_value(body).unwrap_or_else(|e| {
        error!(request_id = ?id, error = %e, "JSON-RPC reply could not be serialized");
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": {
                "code": error_codes::INTERNAL_ERROR,
                "message": "Internal error: reply could not be serialized",
            },
        })
    })
}

/// Routes MCP requests to their handlers.
#[derive(Clone)]
pub struct McpDispatcher {
    tool: GenerateTool,
    server_info: Implementation,
    instructions: String,
}

impl McpDispatcher {
    #[must_use]
    pub fn new(tool: GenerateTool, config: &ServiceConfig) -> Self {
        Self {
            tool,
            server_info: Implementation {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
            },
            instructions: config.instructions.clone(),
        }
    }

    #[must_use]
    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    /// Handles one raw payload: a single message or a batch.
    ///
    /// Batch members are handled concurrently and answered in input order.
    pub async fn dispatch(&self, bytes: &[u8]) -> DispatchReply {
        match parse_payload(bytes) {
            Err(response) => DispatchReply::Single(response),
            Ok(Payload::Single(value)) => match self.handle_value(value).await {
                Some(response) => DispatchReply::Single(response),
                None => DispatchReply::Nothing,
            },
            Ok(Payload::Batch(values)) => {
                let responses: Vec<JsonRpcResponse> =
                    join_all(values.into_iter().map(|v| self.handle_value(v)))
                        .await
                        .into_iter()
                        .flatten()
                        .collect();
                if responses.is_empty() {
                    DispatchReply::Nothing
                } else {
                    DispatchReply::Batch(responses)
                }
            }
        }
    }

    /// Handles one JSON value. Returns `None` for anything that must not be answered.
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        match JsonRpcMessage::from_value(value) {
            Err(response) => Some(response),
            Ok(JsonRpcMessage::Request(request)) => {
                let id = request.id.clone()?;
                Some(match self.handle_request(request).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(err) => JsonRpcResponse::error(Some(id), err),
                })
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                debug!(method = %notification.method, "notification received");
                None
            }
            Ok(JsonRpcMessage::Response(_)) => {
                debug!("ignoring client response");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        debug!(method = %request.method, "dispatching request");
        match request.method.as_str() {
            methods::INITIALIZE => self.initialize(request.params),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => to_value(&ListToolsResult {
                tools: vec![GenerateTool::descriptor()],
            }),
            methods::TOOLS_CALL => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            None | Some(Value::Null) => InitializeParams::default(),
            Some(value) => serde_json::from_value(value).map_err(JsonRpcError::invalid_params)?,
        };

        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            debug!(
                client = %client.name,
                client_version = %client.version,
                protocol_version = protocol_version,
                "client initialized"
            );
        }

        to_value(&InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: self.server_info.clone(),
            instructions: Some(self.instructions.clone()),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(JsonRpcError::invalid_params)?;

        if params.name != relay_core::generation::GENERATE_TOOL_NAME {
            return Err(JsonRpcError::invalid_params(format!(
                "unknown tool: {}",
                params.name
            )));
        }

        let result = self.tool.call(params.arguments).await;
        to_value(&CallToolResult::structured(
            result.to_value(),
            result.is_failure(),
        ))
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::scripted::ScriptedProvider;
    use crate::service::middleware::build_provider_pipeline;

    fn dispatcher(provider: Arc<ScriptedProvider>) -> McpDispatcher {
        let config = ServiceConfig::default();
        let tool = GenerateTool::new(
            build_provider_pipeline(provider, &config),
            config.defaults.clone(),
        );
        McpDispatcher::new(tool, &config)
    }

    async fn single(d: &McpDispatcher, body: Value) -> JsonRpcResponse {
        match d.dispatch(body.to_string().as_bytes()).await {
            DispatchReply::Single(response) => response,
            other => panic!("expected single reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_echoes_supported_version() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(
            &d,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.1"}
            }}),
        )
        .await;
        let result = resp.as_result().unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "openai-relay");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert!(result["instructions"].as_str().unwrap().contains("relays prompts"));
    }

    #[tokio::test]
    async fn initialize_proposes_latest_for_unknown_version() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(
            &d,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "1999-01-01"}}),
        )
        .await;
        assert_eq!(resp.as_result().unwrap()["protocolVersion"], "2025-06-18");
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(&d, json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;
        assert_eq!(resp.as_result().unwrap(), &json!({}));
    }

    #[tokio::test]
    async fn tools_list_advertises_generate() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(&d, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let tools = resp.as_result().unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "generate");
        assert_eq!(tools[0]["inputSchema"]["type"], "object");
    }

    #[tokio::test]
    async fn tools_call_generate_returns_structured_content() {
        let d = dispatcher(Arc::new(ScriptedProvider::replying("Hi!", Some("stop"))));
        let resp = single(
            &d,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "generate",
                "arguments": {"prompt": "Say hi", "model": "test-model", "temperature": 0.2}
            }}),
        )
        .await;
        let result = resp.as_result().unwrap();
        assert_eq!(
            result["structuredContent"],
            json!({"text": "Hi!", "model": "test-model", "finish_reason": "stop"})
        );
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
    }

    #[tokio::test]
    async fn tools_call_failure_sets_is_error() {
        let provider = Arc::new(ScriptedProvider::echo());
        let d = dispatcher(provider.clone());
        let resp = single(
            &d,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {
                "name": "generate",
                "arguments": {"prompt": "   "}
            }}),
        )
        .await;
        let result = resp.as_result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"], "validation_error");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(
            &d,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "summarize"}}),
        )
        .await;
        assert_eq!(resp.as_error().unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let resp = single(&d, json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})).await;
        assert_eq!(resp.as_error().unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let DispatchReply::Single(resp) = d.dispatch(b"{not json").await else {
            panic!("expected single reply");
        };
        assert_eq!(resp.as_error().unwrap().code, error_codes::PARSE_ERROR);
        assert!(resp.id.is_none());
    }

    #[tokio::test]
    async fn notifications_produce_no_reply() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let reply = d
            .dispatch(br#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#)
            .await;
        assert!(reply.is_nothing());
        assert!(reply.to_json().is_none());
    }

    #[tokio::test]
    async fn batch_answers_requests_in_order_and_skips_notifications() {
        let d = dispatcher(Arc::new(ScriptedProvider::echo()));
        let body = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ]);
        let DispatchReply::Batch(responses) = d.dispatch(body.to_string().as_bytes()).await else {
            panic!("expected batch reply");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, Some(relay_core::RequestId::Number(1)));
        assert_eq!(responses[1].id, Some(relay_core::RequestId::Number(2)));
    }

    struct Unrepresentable;

    impl Serialize for Unrepresentable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn unserializable_reply_becomes_internal_error_for_same_id() {
        let value = encode_or_internal(&Unrepresentable, Some(&RequestId::Number(7)));
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], error_codes::INTERNAL_ERROR);
    }

    #[test]
    fn single_and_batch_replies_always_serialize() {
        let single = DispatchReply::Single(JsonRpcResponse::success(RequestId::Number(1), json!({})));
        let parsed: Value = serde_json::from_str(&single.to_json().unwrap()).unwrap();
        assert_eq!(parsed["id"], 1);

        let batch = DispatchReply::Batch(vec![
            JsonRpcResponse::success(RequestId::Number(1), json!({})),
            JsonRpcResponse::error(None, JsonRpcError::internal("boom")),
        ]);
        let parsed: Value = serde_json::from_str(&batch.to_json().unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert!(parsed[1]["id"].is_null());
    }
}
