use relay_core::GenerationDefaults;

/// Name reported in `initialize` and on the root endpoint.
pub const SERVER_NAME: &str = "openai-relay";

/// Usage guidance returned to clients in `initialize`.
pub const SERVER_INSTRUCTIONS: &str =
    "A single-tool server that relays prompts to OpenAI and returns the response.";

/// Configuration for the MCP service layer.
///
/// Controls generation defaults, the provider call deadline, and the identity
/// reported to clients.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Model and temperature applied when a call omits them.
    pub defaults: GenerationDefaults,
    /// Deadline for a single provider call in milliseconds.
    pub provider_timeout_ms: u64,
    pub server_name: String,
    pub server_version: String,
    pub instructions: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            defaults: GenerationDefaults::default(),
            provider_timeout_ms: 60_000,
            server_name: SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: SERVER_INSTRUCTIONS.to_string(),
        }
    }
}
