//! HTTP transports: configuration, routing, middleware, SSE sessions, and shutdown control.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod sessions;
pub mod shutdown;

pub use config::*;
pub use error::{RelayError, RequestOutcome, CLIENT_CLOSED_REQUEST};
pub use handlers::AppState;
pub use module::NetworkModule;
pub use sessions::{OutboundMessage, SessionHandle, SessionId, SessionRegistry};
pub use shutdown::*;
