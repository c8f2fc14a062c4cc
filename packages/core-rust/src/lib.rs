//! `openai-relay` core: JSON-RPC envelopes, MCP payloads, and the `generate` tool contract.

pub mod generation;
pub mod jsonrpc;
pub mod mcp;

pub use generation::{
    GenerateArguments, GenerationDefaults, GenerationFailure, GenerationRequest, GenerationResult,
    GenerationSuccess, ValidationError,
};
pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use mcp::{CallToolParams, CallToolResult, Implementation, Tool};
