//! MCP service layer.
//!
//! 1. **Middleware** (`middleware`): Tower layers around the provider call (timeout, metrics)
//! 2. **Tool** (`generate`): Validation and result shaping for `generate`
//! 3. **Dispatch** (`dispatch`): JSON-RPC method routing shared by all transports

pub mod config;
pub mod dispatch;
pub mod generate;
pub mod middleware;

pub use config::{ServiceConfig, SERVER_INSTRUCTIONS, SERVER_NAME};
pub use dispatch::{DispatchReply, McpDispatcher};
pub use generate::GenerateTool;
pub use middleware::{build_provider_pipeline, ProviderPipeline};
