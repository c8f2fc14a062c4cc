//! Network configuration types for the relay.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the relay talks to its MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Stateless Streamable HTTP on a single endpoint.
    #[default]
    StreamableHttp,
    /// Legacy server-sent events: one stream per session plus a POST endpoint.
    Sse,
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
}

impl TransportMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StreamableHttp => "streamable-http",
            Self::Sse => "sse",
            Self::Stdio => "stdio",
        }
    }

    /// Whether callers on this transport must present a credential.
    ///
    /// stdio is reachable only by the parent process that spawned the relay.
    #[must_use]
    pub fn requires_auth(self) -> bool {
        !matches!(self, Self::Stdio)
    }

    #[must_use]
    pub fn is_network(self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamable-http" | "streamable_http" | "http" => Ok(Self::StreamableHttp),
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!(
                "unknown transport '{other}' (expected streamable-http, sse, or stdio)"
            )),
        }
    }
}

/// Route paths served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Streamable HTTP endpoint; also the path the `Accept` normalizer rewrites.
    pub mcp_path: String,
    /// SSE stream endpoint.
    pub sse_path: String,
    /// SSE message POST endpoint, announced to clients in the `endpoint` event.
    pub messages_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mcp_path: "/mcp".to_string(),
            sse_path: "/sse".to_string(),
            messages_path: "/messages/".to_string(),
        }
    }
}

/// Per-session configuration for the SSE transport.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bounded mpsc channel capacity for outbound events per session.
    pub outbound_channel_capacity: usize,
    /// Maximum time to wait when a session's channel is full.
    pub send_timeout: Duration,
    /// Interval between keep-alive comments on idle streams.
    pub keep_alive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 64,
            send_timeout: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(15),
        }
    }
}

/// Top-level network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    pub transport: TransportMode,
    pub endpoints: EndpointConfig,
    /// Reply with plain JSON on the Streamable HTTP endpoint; `false` frames
    /// each reply as a single SSE `message` event.
    pub json_response: bool,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a response to start.
    pub request_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Maximum time to wait for in-flight requests during shutdown.
    pub drain_timeout: Duration,
    pub sessions: SessionConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            transport: TransportMode::default(),
            endpoints: EndpointConfig::default(),
            json_response: true,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(120),
            max_body_bytes: 4 * 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
            sessions: SessionConfig::default(),
        }
    }
}
