//! Arguments, validation, and results of the `generate` tool.
//!
//! [`GenerateArguments`] is the loosely-typed shape a caller sends.
//! [`GenerationRequest::validate`] turns it into a request that is safe to
//! forward to a provider, or a [`ValidationError`] that the tool reports as a
//! structured failure. Nothing here performs I/O.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Name under which the tool is registered.
pub const GENERATE_TOOL_NAME: &str = "generate";

/// Human-readable tool description advertised by `tools/list`.
pub const GENERATE_TOOL_DESCRIPTION: &str =
    "Send a prompt to the OpenAI API and return the response text.";

/// Inclusive lower bound for `temperature`.
pub const MIN_TEMPERATURE: f64 = 0.0;

/// Inclusive upper bound for `temperature`.
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Keys of `extra` that would clobber fields the relay controls.
pub const RESERVED_EXTRA_KEYS: &[&str] =
    &["model", "messages", "temperature", "max_tokens", "stream", "n"];

/// Failure codes carried in [`GenerationFailure::error`].
pub mod failure_codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const UPSTREAM_TIMEOUT: &str = "upstream_timeout";
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Raw `generate` arguments as sent by the caller.
///
/// Every field is optional at this stage; presence and range checks happen in
/// [`GenerationRequest::validate`] so that missing fields become validation
/// failures rather than decode errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateArguments {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
}

impl GenerateArguments {
    /// Decodes arguments from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedArguments`] when a field has the
    /// wrong JSON type (e.g. a numeric `prompt` or fractional `max_tokens`).
    pub fn from_map(arguments: Map<String, Value>) -> Result<Self, ValidationError> {
        serde_json::from_value(Value::Object(arguments))
            .map_err(|e| ValidationError::MalformedArguments(e.to_string()))
    }
}

/// JSON Schema of the tool input, advertised by `tools/list`.
#[must_use]
pub fn generate_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": {
                "type": "string",
                "description": "User text to send"
            },
            "model": {
                "type": "string",
                "description": "Model name (defaults to the server's configured model)"
            },
            "temperature": {
                "type": "number",
                "minimum": MIN_TEMPERATURE,
                "maximum": MAX_TEMPERATURE,
                "description": "Sampling temperature"
            },
            "max_tokens": {
                "type": "integer",
                "minimum": 1,
                "description": "Optional maximum number of output tokens"
            },
            "extra": {
                "type": "object",
                "additionalProperties": true,
                "description": "Additional provider parameters, e.g. top_p or presence_penalty"
            }
        },
        "required": ["prompt"]
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reasons a `generate` call is rejected before reaching the provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("prompt is required and must be a non-empty string")]
    MissingPrompt,
    #[error("temperature must be between 0 and 2, got {value}")]
    TemperatureOutOfRange { value: f64 },
    #[error("max_tokens must be a positive integer, got {value}")]
    InvalidMaxTokens { value: i64 },
    #[error("extra may not override reserved parameter `{key}`")]
    ReservedExtraKey { key: String },
    #[error("invalid arguments: {0}")]
    MalformedArguments(String),
}

/// Server-side fallbacks for optional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: String,
    pub temperature: f64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

/// Returns `true` if `value` is a finite temperature within the accepted range.
#[must_use]
pub fn temperature_in_range(value: f64) -> bool {
    value.is_finite() && (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value)
}

/// A validated request, ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// The prompt exactly as sent; only its trimmed form is checked for emptiness.
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub extra: Map<String, Value>,
}

impl GenerationRequest {
    /// Validates raw arguments and applies defaults.
    ///
    /// Out-of-range temperatures are rejected, not clamped. A blank `model`
    /// falls back to the default.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered, checking prompt,
    /// temperature, `max_tokens`, then `extra`.
    pub fn validate(
        args: GenerateArguments,
        defaults: &GenerationDefaults,
    ) -> Result<Self, ValidationError> {
        let prompt = match args.prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(ValidationError::MissingPrompt),
        };

        let temperature = args.temperature.unwrap_or(defaults.temperature);
        if !temperature_in_range(temperature) {
            return Err(ValidationError::TemperatureOutOfRange { value: temperature });
        }

        let max_tokens = match args.max_tokens {
            None => None,
            Some(value) => match u32::try_from(value) {
                Ok(n) if n > 0 => Some(n),
                _ => return Err(ValidationError::InvalidMaxTokens { value }),
            },
        };

        let extra = args.extra.unwrap_or_default();
        if let Some(key) = RESERVED_EXTRA_KEYS
            .iter()
            .find(|key| extra.contains_key(**key))
        {
            return Err(ValidationError::ReservedExtraKey {
                key: (*key).to_string(),
            });
        }

        let model = args
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| defaults.model.clone());

        Ok(Self {
            prompt,
            model,
            temperature,
            max_tokens,
            extra,
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSuccess {
    pub text: String,
    pub model: String,
    pub finish_reason: String,
}

/// Structured failure, reported as tool content rather than a protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub error: String,
    pub detail: String,
}

impl GenerationFailure {
    #[must_use]
    pub fn new(error: &str, detail: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<&ValidationError> for GenerationFailure {
    fn from(err: &ValidationError) -> Self {
        Self::new(failure_codes::VALIDATION_ERROR, err.to_string())
    }
}

/// Outcome of one `generate` call: exactly one of success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Success(GenerationSuccess),
    Failure(GenerationFailure),
}

impl GenerationResult {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Serializes the result as the tool's structured content.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success(s) => json!({
                "text": s.text,
                "model": s.model,
                "finish_reason": s.finish_reason,
            }),
            Self::Failure(f) => json!({
                "error": f.error,
                "detail": f.detail,
            }),
        }
    }
}

impl From<ValidationError> for GenerationResult {
    fn from(err: ValidationError) -> Self {
        Self::Failure(GenerationFailure::from(&err))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
