//! OpenAI-compatible chat-completions backend.
//!
//! Works against api.openai.com and anything that speaks the same wire format
//! (Azure OpenAI behind a proxy, vLLM, Together, Groq, ...). Each `generate`
//! call becomes one non-streaming `POST {base_url}/chat/completions` with a
//! single user message.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::GenerationRequest;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::traits::{Completion, GenerationProvider, ProviderError, TokenUsage};

/// Default API base when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Upper bound on provider error text carried into results and logs.
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

/// Connection settings for [`OpenAiProvider`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// [`GenerationProvider`] backed by an OpenAI-compatible HTTP API.
///
/// The overall call deadline is enforced by the provider pipeline's timeout
/// layer, not by the HTTP client, so a stalled upstream surfaces as
/// [`ProviderError::Timeout`] uniformly.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    headers: HeaderMap,
}

impl OpenAiProvider {
    /// Builds the HTTP client and precomputes request headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be constructed (e.g. TLS backend failure).
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY contains characters not allowed in an HTTP header"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            endpoint: chat_completions_url(&config.base_url),
            headers,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = extract_error_message(&body);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                ProviderError::RateLimited { message }
            } else {
                ProviderError::Http {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        parse_completion(&body)
    }
}

/// Joins the base URL and the chat-completions path, tolerating a trailing slash.
fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Builds the JSON request body. `extra` keys are merged last; reserved keys
/// were already rejected during validation.
fn build_request_body(request: &GenerationRequest) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert(
        "messages".to_string(),
        json!([{ "role": "user", "content": request.prompt }]),
    );
    body.insert("temperature".to_string(), json!(request.temperature));
    if let Some(max_tokens) = request.max_tokens {
        body.insert("max_tokens".to_string(), json!(max_tokens));
    }
    for (key, value) in &request.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Maps a successful response body onto a [`Completion`].
fn parse_completion(body: &[u8]) -> Result<Completion, ProviderError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyChoices)?;

    Ok(Completion {
        text: choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default(),
        finish_reason: choice.finish_reason,
        provider_model: parsed.model,
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

/// Pulls `error.message` out of an OpenAI-style error body, falling back to
/// the raw text. The result is truncated to keep logs and results bounded.
fn extract_error_message(body: &[u8]) -> String {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| match e {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if message.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        let mut truncated: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{GenerateArguments, GenerationDefaults};

    use super::*;

    fn request(max_tokens: Option<i64>, extra: Option<Map<String, Value>>) -> GenerationRequest {
        GenerationRequest::validate(
            GenerateArguments {
                prompt: Some("Say hi".to_string()),
                model: Some("test-model".to_string()),
                temperature: Some(0.5),
                max_tokens,
                extra,
            },
            &GenerationDefaults::default(),
        )
        .unwrap()
    }

    #[test]
    fn url_join_tolerates_trailing_slash() {
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn body_contains_single_user_message() {
        let body = build_request_body(&request(None, None));
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "Say hi"}]));
        assert_eq!(body["temperature"], json!(0.5));
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn body_merges_extra_and_max_tokens() {
        let mut extra = Map::new();
        extra.insert("top_p".to_string(), json!(0.9));
        extra.insert("presence_penalty".to_string(), json!(0.1));
        let body = build_request_body(&request(Some(64), Some(extra)));
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["top_p"], json!(0.9));
        assert_eq!(body["presence_penalty"], json!(0.1));
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = br#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [
                {"message": {"role": "assistant", "content": " Hi! "}, "finish_reason": "stop"},
                {"message": {"role": "assistant", "content": "ignored"}, "finish_reason": "length"}
            ],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }"#;
        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.text, " Hi! ");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(
            completion.provider_model.as_deref(),
            Some("gpt-4o-mini-2024-07-18")
        );
        assert_eq!(completion.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn null_content_becomes_empty_text() {
        let body = br#"{"choices": [{"message": {"content": null}, "finish_reason": null}]}"#;
        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.text, "");
        assert!(completion.finish_reason.is_none());
        assert!(completion.usage.is_none());
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert_eq!(
            parse_completion(br#"{"choices": []}"#).unwrap_err(),
            ProviderError::EmptyChoices
        );
    }

    #[test]
    fn garbage_body_is_decode_error() {
        assert!(matches!(
            parse_completion(b"<html>").unwrap_err(),
            ProviderError::Decode(_)
        ));
    }

    #[test]
    fn error_message_prefers_structured_field() {
        let body = br#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body), "Incorrect API key provided");
        assert_eq!(extract_error_message(b"upstream exploded"), "upstream exploded");
    }

    #[test]
    fn error_message_is_truncated() {
        let long = "x".repeat(1000);
        let message = extract_error_message(long.as_bytes());
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS + 3);
    }

    #[test]
    fn provider_construction_precomputes_endpoint() {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = "http://localhost:9999/v1/".to_string();
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:9999/v1/chat/completions");
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn config_debug_hides_api_key() {
        let rendered = format!("{:?}", OpenAiConfig::new("sk-very-secret"));
        assert!(!rendered.contains("sk-very-secret"));
    }
}
