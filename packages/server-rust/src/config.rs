//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback so the relay can be configured the
//! same way under a process manager, a container, or an MCP client that
//! spawns it over stdio.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Parser;
use relay_core::generation::temperature_in_range;
use relay_core::GenerationDefaults;

use crate::auth::AuthPolicy;
use crate::logging::LogFormat;
use crate::network::{NetworkConfig, TransportMode};
use crate::provider::{OpenAiConfig, DEFAULT_BASE_URL};
use crate::service::ServiceConfig;

#[derive(Clone, Parser)]
#[command(
    name = "openai-relay",
    version,
    about = "MCP server exposing a single `generate` tool backed by OpenAI chat completions"
)]
pub struct RelayArgs {
    /// OpenAI API key used for outbound calls.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Model used when a call does not name one.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Temperature used when a call does not set one.
    #[arg(long, env = "OPENAI_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f64,

    /// Deadline for a single provider call.
    #[arg(long, env = "OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    pub openai_timeout_secs: u64,

    /// Credential MCP clients must present. Generated at startup when unset.
    #[arg(long, env = "MCP_API_KEY", hide_env_values = true)]
    pub mcp_api_key: Option<String>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// streamable-http, sse, or stdio.
    #[arg(long, env = "MCP_TRANSPORT", default_value = "streamable-http")]
    pub transport: TransportMode,

    /// Comma-separated paths that skip authentication. `/health` and `/` always do.
    #[arg(long, env = "MCP_AUTH_BYPASS_PATHS", value_delimiter = ',', default_value = "/health,/")]
    pub auth_bypass_paths: Vec<String>,

    /// Reply with plain JSON on the streamable HTTP endpoint instead of an SSE frame.
    #[arg(
        long,
        env = "MCP_JSON_RESPONSE",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub json_response: bool,

    /// Comma-separated allowed CORS origins; `*` allows any.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "MCP_MAX_BODY_BYTES", default_value_t = 4 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// How long shutdown waits for in-flight requests.
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Startup configuration problems. Each one stops the process before it binds.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is required")]
    MissingProviderKey,
    #[error("default model must not be blank")]
    BlankModel,
    #[error("default temperature {0} is outside [0, 2]")]
    TemperatureOutOfRange(f64),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error(
        "REQUEST_TIMEOUT_SECS ({request}) must be greater than OPENAI_TIMEOUT_SECS ({provider})"
    )]
    RequestTimeoutNotAboveProvider { request: u64, provider: u64 },
    #[error("auth bypass path '{0}' must start with '/'")]
    InvalidBypassPath(String),
}

/// Fully validated configuration, split per subsystem.
#[derive(Clone)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub service: ServiceConfig,
    pub openai: OpenAiConfig,
    pub auth_policy: AuthPolicy,
    /// Configured client credential; `None` means generate one.
    pub mcp_api_key: Option<String>,
    pub log_format: LogFormat,
}

impl RelayArgs {
    /// Validates the arguments and builds per-subsystem configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let api_key = self
            .openai_api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingProviderKey)?;

        let model = self.model.trim().to_string();
        if model.is_empty() {
            return Err(ConfigError::BlankModel);
        }
        if !temperature_in_range(self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        for (name, value) in [
            ("OPENAI_TIMEOUT_SECS", self.openai_timeout_secs),
            ("REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        // A slow provider must surface as an `upstream_timeout` result, not an HTTP 408.
        if self.request_timeout_secs <= self.openai_timeout_secs {
            return Err(ConfigError::RequestTimeoutNotAboveProvider {
                request: self.request_timeout_secs,
                provider: self.openai_timeout_secs,
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Zero("MCP_MAX_BODY_BYTES"));
        }

        let bypass: Vec<String> = self
            .auth_bypass_paths
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(bad) = bypass.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::InvalidBypassPath(bad.clone()));
        }

        let cors_origins = self
            .cors_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let network = NetworkConfig {
            host: self.host,
            port: self.port,
            transport: self.transport,
            json_response: self.json_response,
            cors_origins,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_body_bytes: self.max_body_bytes,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        };

        let service = ServiceConfig {
            defaults: GenerationDefaults {
                model,
                temperature: self.temperature,
            },
            provider_timeout_ms: self.openai_timeout_secs.saturating_mul(1000),
            ..ServiceConfig::default()
        };

        let openai = OpenAiConfig {
            base_url: self.openai_base_url.trim().to_string(),
            ..OpenAiConfig::new(api_key)
        };

        Ok(RelayConfig {
            network,
            service,
            openai,
            auth_policy: AuthPolicy::new(bypass),
            mcp_api_key: self.mcp_api_key,
            log_format: self.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<RelayConfig, ConfigError> {
        let mut argv = vec!["openai-relay", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(extra);
        RelayArgs::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn flags_flow_into_subsystem_configs() {
        let config = parse(&[
            "--model",
            "gpt-4o",
            "--temperature",
            "1.5",
            "--openai-timeout-secs",
            "5",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--transport",
            "sse",
            "--json-response",
            "false",
            "--cors-origins",
            "https://a.example, https://b.example",
        ])
        .unwrap();

        assert_eq!(config.service.defaults.model, "gpt-4o");
        assert!((config.service.defaults.temperature - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.service.provider_timeout_ms, 5_000);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.network.port, 9100);
        assert_eq!(config.network.transport, TransportMode::Sse);
        assert!(!config.network.json_response);
        assert_eq!(
            config.network.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.openai.api_key, "sk-test");
    }

    #[test]
    fn bypass_paths_are_parsed_and_always_include_health_and_root() {
        let config = parse(&["--auth-bypass-paths", "/status, /metrics"]).unwrap();
        assert_eq!(
            config.auth_policy.bypass_paths(),
            ["/health", "/", "/status", "/metrics"]
        );
    }

    #[test]
    fn relative_bypass_path_is_rejected() {
        assert_eq!(
            parse(&["--auth-bypass-paths", "status"]).err(),
            Some(ConfigError::InvalidBypassPath("status".to_string()))
        );
    }

    #[test]
    fn blank_provider_key_is_rejected() {
        let args = RelayArgs::try_parse_from(["openai-relay", "--openai-api-key", "  "]).unwrap();
        assert_eq!(args.into_config().err(), Some(ConfigError::MissingProviderKey));
    }

    #[test]
    fn out_of_range_default_temperature_is_rejected() {
        assert_eq!(
            parse(&["--temperature", "2.5"]).err(),
            Some(ConfigError::TemperatureOutOfRange(2.5))
        );
    }

    #[test]
    fn zero_timeouts_and_limits_are_rejected() {
        assert_eq!(
            parse(&["--request-timeout-secs", "0"]).err(),
            Some(ConfigError::Zero("REQUEST_TIMEOUT_SECS"))
        );
        assert_eq!(
            parse(&["--max-body-bytes", "0"]).err(),
            Some(ConfigError::Zero("MCP_MAX_BODY_BYTES"))
        );
    }

    #[test]
    fn request_timeout_must_exceed_provider_timeout() {
        assert_eq!(
            parse(&["--request-timeout-secs", "10", "--openai-timeout-secs", "60"]).err(),
            Some(ConfigError::RequestTimeoutNotAboveProvider {
                request: 10,
                provider: 60,
            })
        );
        assert_eq!(
            parse(&["--request-timeout-secs", "60", "--openai-timeout-secs", "60"]).err(),
            Some(ConfigError::RequestTimeoutNotAboveProvider {
                request: 60,
                provider: 60,
            })
        );
        assert!(parse(&["--request-timeout-secs", "61", "--openai-timeout-secs", "60"]).is_ok());
    }

    #[test]
    fn unknown_transport_fails_to_parse() {
        assert!(RelayArgs::try_parse_from([
            "openai-relay",
            "--openai-api-key",
            "sk-test",
            "--transport",
            "websocket",
        ])
        .is_err());
    }

    #[test]
    fn json_response_accepts_boolish_values() {
        assert!(!parse(&["--json-response", "0"]).unwrap().network.json_response);
        assert!(parse(&["--json-response", "yes"]).unwrap().network.json_response);
    }
}
