//! The `generate` tool: validation, provider call, and result shaping.
//!
//! Every call ends in a [`GenerationResult`]. Invalid arguments and provider
//! failures become structured failures; nothing here surfaces as a protocol
//! error or a panic. Validation always runs before the provider is touched,
//! so a rejected call never produces outbound traffic.

use relay_core::generation::{
    failure_codes, generate_input_schema, GENERATE_TOOL_DESCRIPTION, GENERATE_TOOL_NAME,
};
use relay_core::{
    GenerateArguments, GenerationDefaults, GenerationFailure, GenerationRequest,
    GenerationResult, GenerationSuccess, Tool,
};
use serde_json::{Map, Value};
use tower::ServiceExt;
use tracing::{error, info};

use super::middleware::ProviderPipeline;
use crate::traits::ProviderError;

/// Characters of the prompt included in failure logs.
const PROMPT_EXCERPT_CHARS: usize = 80;

/// Finish reason reported when the provider omits one.
const DEFAULT_FINISH_REASON: &str = "stop";

/// Handler for the `generate` tool.
#[derive(Clone)]
pub struct GenerateTool {
    pipeline: ProviderPipeline,
    defaults: GenerationDefaults,
}

impl GenerateTool {
    #[must_use]
    pub fn new(pipeline: ProviderPipeline, defaults: GenerationDefaults) -> Self {
        Self { pipeline, defaults }
    }

    /// Descriptor advertised by `tools/list`.
    #[must_use]
    pub fn descriptor() -> Tool {
        Tool {
            name: GENERATE_TOOL_NAME.to_string(),
            description: GENERATE_TOOL_DESCRIPTION.to_string(),
            input_schema: generate_input_schema(),
        }
    }

    #[must_use]
    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Runs the tool on raw `tools/call` arguments.
    ///
    /// Arguments of the wrong JSON type are a validation failure.
    pub async fn call(&self, arguments: Option<Map<String, Value>>) -> GenerationResult {
        match GenerateArguments::from_map(arguments.unwrap_or_default()) {
            Ok(args) => self.generate(args).await,
            Err(err) => {
                error!(
                    error = failure_codes::VALIDATION_ERROR,
                    detail = %err,
                    "generate rejected"
                );
                GenerationResult::from(err)
            }
        }
    }

    /// Validates `args`, calls the provider, and shapes the result.
    pub async fn generate(&self, args: GenerateArguments) -> GenerationResult {
        let excerpt = args
            .prompt
            .as_deref()
            .map(|p| prompt_excerpt(p, PROMPT_EXCERPT_CHARS))
            .unwrap_or_default();

        let request = match GenerationRequest::validate(args, &self.defaults) {
            Ok(request) => request,
            Err(err) => {
                error!(
                    error = failure_codes::VALIDATION_ERROR,
                    detail = %err,
                    prompt = %excerpt,
                    "generate rejected"
                );
                return GenerationResult::from(err);
            }
        };

        let model = request.model.clone();
        let prompt_chars = request.prompt.chars().count();

        match self.pipeline.clone().oneshot(request).await {
            Ok(completion) => {
                let finish_reason = completion
                    .finish_reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string());
                let usage = completion.usage.unwrap_or_default();
                info!(
                    model = %model,
                    prompt_chars = prompt_chars,
                    finish_reason = %finish_reason,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    "generate complete"
                );
                GenerationResult::Success(GenerationSuccess {
                    text: completion.text.trim().to_string(),
                    model,
                    finish_reason,
                })
            }
            Err(err) => {
                let code = failure_code(&err);
                error!(
                    error = code,
                    detail = %err,
                    model = %model,
                    prompt = %excerpt,
                    "generate failed"
                );
                GenerationResult::Failure(GenerationFailure::new(code, err.to_string()))
            }
        }
    }
}

/// Maps a provider error onto a failure code.
fn failure_code(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Timeout { .. } => failure_codes::UPSTREAM_TIMEOUT,
        _ => failure_codes::UPSTREAM_ERROR,
    }
}

/// First `max_chars` characters of `prompt`, with an ellipsis if cut.
fn prompt_excerpt(prompt: &str, max_chars: usize) -> String {
    let mut chars = prompt.chars();
    let mut excerpt: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        excerpt.push_str("...");
    }
    excerpt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::provider::scripted::ScriptedProvider;
    use crate::service::config::ServiceConfig;
    use crate::service::middleware::build_provider_pipeline;

    fn tool_with(provider: Arc<ScriptedProvider>, config: &ServiceConfig) -> GenerateTool {
        GenerateTool::new(
            build_provider_pipeline(provider, config),
            config.defaults.clone(),
        )
    }

    fn tool(provider: Arc<ScriptedProvider>) -> GenerateTool {
        tool_with(provider, &ServiceConfig::default())
    }

    fn args(prompt: &str) -> GenerateArguments {
        GenerateArguments {
            prompt: Some(prompt.to_string()),
            ..GenerateArguments::default()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    fn assert_failure(result: &GenerationResult, code: &str) {
        match result {
            GenerationResult::Failure(f) => assert_eq!(f.error, code),
            GenerationResult::Success(s) => panic!("expected failure, got {s:?}"),
        }
    }

    #[tokio::test]
    async fn say_hi_round_trip() {
        let provider = Arc::new(ScriptedProvider::replying("Hi!", Some("stop")));
        let tool = tool(provider.clone());

        let result = tool
            .generate(GenerateArguments {
                prompt: Some("Say hi".to_string()),
                model: Some("test-model".to_string()),
                temperature: Some(0.2),
                ..GenerateArguments::default()
            })
            .await;

        assert_eq!(
            result.to_value(),
            json!({"text": "Hi!", "model": "test-model", "finish_reason": "stop"})
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn text_is_trimmed_and_finish_reason_defaults() {
        let provider = Arc::new(ScriptedProvider::replying("  spaced out \n", None));
        let result = tool(provider).generate(args("x")).await;
        let GenerationResult::Success(success) = result else {
            panic!("expected success");
        };
        assert_eq!(success.text, "spaced out");
        assert_eq!(success.finish_reason, "stop");
        assert_eq!(success.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn defaults_are_applied_to_provider_request() {
        let provider = Arc::new(ScriptedProvider::echo());
        let _ = tool(provider.clone()).generate(args("hello")).await;

        let sent = &provider.requests()[0];
        assert_eq!(sent.model, "gpt-4o-mini");
        assert!((sent.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(sent.max_tokens, None);
    }

    #[tokio::test]
    async fn malformed_arguments_are_validation_failures() {
        let provider = Arc::new(ScriptedProvider::echo());
        let tool = tool(provider.clone());

        let mut map = Map::new();
        map.insert("prompt".to_string(), json!(42));
        let result = tool.call(Some(map)).await;

        assert_failure(&result, failure_codes::VALIDATION_ERROR);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn missing_arguments_are_validation_failures() {
        let provider = Arc::new(ScriptedProvider::echo());
        let result = tool(provider.clone()).call(None).await;
        assert_failure(&result, failure_codes::VALIDATION_ERROR);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn reserved_extra_key_is_rejected() {
        let provider = Arc::new(ScriptedProvider::echo());
        let mut extra = Map::new();
        extra.insert("messages".to_string(), json!([]));
        let result = tool(provider.clone())
            .generate(GenerateArguments {
                extra: Some(extra),
                ..args("hello")
            })
            .await;
        assert_failure(&result, failure_codes::VALIDATION_ERROR);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn provider_error_becomes_upstream_error() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Http {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        }));
        let result = tool(provider).generate(args("hello")).await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.error, failure_codes::UPSTREAM_ERROR);
        assert!(failure.detail.contains("HTTP 401"));
    }

    #[tokio::test]
    async fn slow_provider_becomes_upstream_timeout() {
        let provider =
            Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(500)));
        let config = ServiceConfig {
            provider_timeout_ms: 20,
            ..ServiceConfig::default()
        };
        let result = tool_with(provider, &config).generate(args("hello")).await;
        assert_failure(&result, failure_codes::UPSTREAM_TIMEOUT);
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_results() {
        let provider =
            Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(25)));
        let tool = tool(provider.clone());

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let tool = tool.clone();
                tokio::spawn(async move { (i, tool.generate(args(&format!("prompt-{i}"))).await) })
            })
            .collect();

        for handle in handles {
            let (i, result) = handle.await.unwrap();
            let GenerationResult::Success(success) = result else {
                panic!("call {i} failed");
            };
            assert_eq!(success.text, format!("prompt-{i}"));
        }
        assert_eq!(provider.calls(), 50);
    }

    #[test]
    fn excerpt_is_bounded() {
        assert_eq!(prompt_excerpt("short", 80), "short");
        let long = "é".repeat(100);
        let excerpt = prompt_excerpt(&long, 80);
        assert_eq!(excerpt.chars().count(), 83);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn descriptor_requires_prompt() {
        let tool = GenerateTool::descriptor();
        assert_eq!(tool.name, "generate");
        assert_eq!(tool.input_schema["required"], json!(["prompt"]));
    }

    proptest! {
        #[test]
        fn blank_prompts_never_reach_provider(prompt in "[ \t\r\n]{0,16}") {
            let provider = Arc::new(ScriptedProvider::echo());
            let tool = tool(provider.clone());
            let result = runtime().block_on(tool.generate(args(&prompt)));
            prop_assert!(result.is_failure());
            prop_assert_eq!(provider.calls(), 0);
        }

        #[test]
        fn out_of_range_temperature_is_structured_failure(
            temperature in prop_oneof![-1.0e6f64..-1.0e-9, 2.000_001f64..1.0e6],
        ) {
            let provider = Arc::new(ScriptedProvider::echo());
            let tool = tool(provider.clone());
            let result = runtime().block_on(tool.generate(GenerateArguments {
                temperature: Some(temperature),
                ..args("hello")
            }));
            let GenerationResult::Failure(failure) = result else {
                return Err(TestCaseError::fail("expected failure"));
            };
            prop_assert_eq!(failure.error, failure_codes::VALIDATION_ERROR);
            prop_assert_eq!(provider.calls(), 0);
        }
    }
}
