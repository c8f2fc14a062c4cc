//! Caller authentication: credential storage and per-request checks.

pub mod authenticator;
pub mod credential;

pub use authenticator::{
    AuthOutcome, AuthPolicy, Authenticator, DenyReason, API_KEY_HEADER, HEALTH_PATH, ROOT_PATH,
};
pub use credential::{CredentialSource, CredentialStore};
