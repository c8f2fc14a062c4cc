use async_trait::async_trait;
use relay_core::GenerationRequest;

/// Token accounting reported by a provider, when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Provider-neutral completion returned by a [`GenerationProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// First choice's message content, untrimmed. Empty if the provider sent none.
    pub text: String,
    /// Provider finish reason, if reported.
    pub finish_reason: Option<String>,
    /// Model name the provider says it used.
    pub provider_model: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Failures of an outbound generation call.
///
/// These are expected conditions: the `generate` tool turns every variant
/// into a structured failure result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider rate limit exceeded: {message}")]
    RateLimited { message: String },
    #[error("could not reach provider: {0}")]
    Transport(String),
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider response contained no choices")]
    EmptyChoices,
    #[error("provider call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Pluggable text-generation backend.
/// Implementations: OpenAI-compatible HTTP (`provider::openai`), scripted (tests).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Runs a single chat completion for the validated request.
    async fn complete(&self, request: &GenerationRequest) -> Result<Completion, ProviderError>;
}
