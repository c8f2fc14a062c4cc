//! Tower middleware for the HTTP transports.
//!
//! - `http`: transport layers applied to every route
//! - `pipeline`: normalizer, fault containment and auth for the MCP routes

pub mod accept;
pub mod auth;
pub mod containment;
pub mod http;
pub mod pipeline;

pub use accept::{AcceptNormalizerLayer, NORMALIZED_ACCEPT};
pub use auth::AuthLayer;
pub use containment::FaultContainmentLayer;
pub use http::{build_http_layers, REQUEST_ID_HEADER};
pub use pipeline::{build_request_pipeline, RequestPipeline};
