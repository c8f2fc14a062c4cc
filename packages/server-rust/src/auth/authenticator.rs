//! Per-request credential check for network transports.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tracing::warn;

use super::credential::CredentialStore;

/// Dedicated API-key header, checked after `Authorization`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Liveness probe path; always bypasses authentication.
pub const HEALTH_PATH: &str = "/health";

/// Root path; always bypasses authentication.
pub const ROOT_PATH: &str = "/";

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingCredential,
    InvalidCredential,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing credential",
            Self::InvalidCredential => "invalid credential",
        }
    }
}

/// Result of [`Authenticator::authenticate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Allow,
    Deny(DenyReason),
}

/// Paths that skip credential checks.
///
/// The liveness probe and root path are always included; operators can add
/// more through configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    bypass_paths: Vec<String>,
}

impl AuthPolicy {
    #[must_use]
    pub fn new(extra_bypass_paths: impl IntoIterator<Item = String>) -> Self {
        let mut bypass_paths = vec![HEALTH_PATH.to_string(), ROOT_PATH.to_string()];
        for path in extra_bypass_paths {
            let path = path.trim().to_string();
            if !path.is_empty() && !bypass_paths.contains(&path) {
                bypass_paths.push(path);
            }
        }
        Self { bypass_paths }
    }

    #[must_use]
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }

    #[must_use]
    pub fn bypass_paths(&self) -> &[String] {
        &self.bypass_paths
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

/// Validates inbound credentials against the [`CredentialStore`].
///
/// Stateless apart from the shared, immutable store: every request is
/// checked on its own and nothing is cached per connection or session.
#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<CredentialStore>,
    policy: AuthPolicy,
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, policy: AuthPolicy) -> Self {
        Self { store, policy }
    }

    /// Decides whether a request to `path` carrying `headers` may proceed.
    ///
    /// `Authorization: Bearer <key>` is consulted first, then `X-API-Key`.
    /// A bearer token that does not match does not shadow a valid API-key
    /// header. Every denial is logged at `warn` with the path and reason;
    /// the candidate value is never logged.
    #[must_use]
    pub fn authenticate(&self, path: &str, headers: &HeaderMap) -> AuthOutcome {
        if self.policy.is_bypassed(path) {
            return AuthOutcome::Allow;
        }

        let bearer = bearer_token(headers);
        let api_key = api_key(headers);

        let reason = if bearer.is_none() && api_key.is_none() {
            DenyReason::MissingCredential
        } else if bearer.is_some_and(|t| self.store.matches(t))
            || api_key.is_some_and(|k| self.store.matches(k))
        {
            return AuthOutcome::Allow;
        } else {
            DenyReason::InvalidCredential
        };

        warn!(path = path, reason = reason.as_str(), "authentication denied");
        AuthOutcome::Deny(reason)
    }

    #[must_use]
    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }
}

/// Extracts the token from `Authorization: Bearer <token>` (scheme is case-insensitive).
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}
