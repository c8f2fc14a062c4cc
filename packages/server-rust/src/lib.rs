//! `openai-relay` server: MCP transports, caller auth, fault containment, and the OpenAI provider.

pub mod auth;
pub mod config;
pub mod logging;
pub mod network;
pub mod provider;
pub mod service;
pub mod stdio;
pub mod traits;

pub use traits::{Completion, GenerationProvider, ProviderError, TokenUsage};
