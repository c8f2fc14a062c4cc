//! JSON-RPC 2.0 envelope types.
//!
//! Inbound payloads are parsed in two steps: [`parse_payload`] splits the raw
//! bytes into a single value or a batch, then [`JsonRpcMessage::from_value`]
//! classifies each value as a request, a notification, or a client-side
//! response. Every failure along the way is already shaped as the
//! [`JsonRpcResponse`] that should be sent back, so transports never have to
//! build error envelopes themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version accepted in the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ---------------------------------------------------------------------------
// Identifiers and envelopes
// ---------------------------------------------------------------------------

/// Request identifier. JSON-RPC allows either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// An inbound request or notification.
///
/// A missing `id` marks the message as a notification, which never receives
/// a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds a request with the given id, method and params.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Builds a notification (no id).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Error object carried inside an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(error_codes::PARSE_ERROR, format!("Parse error: {detail}"))
    }

    #[must_use]
    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(
            error_codes::INVALID_REQUEST,
            format!("Invalid request: {detail}"),
        )
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    #[must_use]
    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(
            error_codes::INVALID_PARAMS,
            format!("Invalid params: {detail}"),
        )
    }

    #[must_use]
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, format!("Internal error: {detail}"))
    }
}

/// Result-or-error half of a response, flattened into the envelope so it
/// serializes as either a `result` or an `error` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseBody {
    Result(Value),
    Error(JsonRpcError),
}

/// An outbound response.
///
/// `id` serializes as `null` when the request id could not be determined
/// (parse errors, invalid envelopes), as required by JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            body: ResponseBody::Result(result),
        }
    }

    #[must_use]
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            body: ResponseBody::Error(error),
        }
    }

    /// Returns the error object if this is an error response.
    #[must_use]
    pub fn as_error(&self) -> Option<&JsonRpcError> {
        match &self.body {
            ResponseBody::Error(err) => Some(err),
            ResponseBody::Result(_) => None,
        }
    }

    /// Returns the result value if this is a success response.
    #[must_use]
    pub fn as_result(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Result(value) => Some(value),
            ResponseBody::Error(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound classification
// ---------------------------------------------------------------------------

/// Raw inbound payload: one message or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(Value),
    Batch(Vec<Value>),
}

/// Splits raw bytes into a single message or a non-empty batch.
///
/// # Errors
///
/// Returns a ready-to-send parse error for malformed JSON and an
/// invalid-request error for an empty batch.
pub fn parse_payload(bytes: &[u8]) -> Result<Payload, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| JsonRpcResponse::error(None, JsonRpcError::parse_error(e)))?;

    match value {
        Value::Array(items) if items.is_empty() => Err(JsonRpcResponse::error(
            None,
            JsonRpcError::invalid_request("empty batch"),
        )),
        Value::Array(items) => Ok(Payload::Batch(items)),
        other => Ok(Payload::Single(other)),
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A request carrying an id; must be answered.
    Request(JsonRpcRequest),
    /// A request without an id; must not be answered.
    Notification(JsonRpcRequest),
    /// A response from the client to a server-initiated request.
    Response(Value),
}

impl JsonRpcMessage {
    /// Classifies a single JSON value.
    ///
    /// # Errors
    ///
    /// Returns a ready-to-send invalid-request error when the value is not a
    /// JSON-RPC 2.0 object.
    pub fn from_value(value: Value) -> Result<Self, JsonRpcResponse> {
        let Value::Object(ref map) = value else {
            return Err(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("message must be a JSON object"),
            ));
        };

        // Best-effort id recovery so error replies can be correlated.
        let id = map
            .get("id")
            .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());

        if map.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        if map.contains_key("method") {
            let request: JsonRpcRequest = serde_json::from_value(value)
                .map_err(|e| JsonRpcResponse::error(id, JsonRpcError::invalid_request(e)))?;
            return Ok(if request.id.is_some() {
                Self::Request(request)
            } else {
                Self::Notification(request)
            });
        }

        if map.contains_key("result") || map.contains_key("error") {
            return Ok(Self::Response(value));
        }

        Err(JsonRpcResponse::error(
            id,
            JsonRpcError::invalid_request("missing method"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
