//! Tower middleware layers for the provider call pipeline.
//!
//! - [`timeout`]: Provider call deadline
//! - [`metrics`]: Call timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes the layers around a provider

pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use pipeline::{build_provider_pipeline, ProviderPipeline, ProviderService};
pub use timeout::TimeoutLayer;
