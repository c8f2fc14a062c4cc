//! Caller credential held as a SHA-256 digest.
//!
//! The plaintext credential is hashed as soon as it is read and then dropped.
//! Candidates are hashed the same way and compared with
//! [`subtle::ConstantTimeEq`], so comparison time does not depend on where
//! the first differing byte is.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Random bytes in a generated credential (43 URL-safe base64 characters).
const GENERATED_KEY_BYTES: usize = 32;

/// Digest bytes exposed by [`CredentialStore::fingerprint`].
const FINGERPRINT_BYTES: usize = 4;

/// Where the stored credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Supplied through configuration.
    Configured,
    /// Generated at startup because none was configured.
    Generated,
}

/// Immutable store for the expected caller credential.
///
/// Built once at startup and shared behind an `Arc`; there is no way to
/// change the credential afterwards.
pub struct CredentialStore {
    digest: [u8; 32],
    source: CredentialSource,
}

impl CredentialStore {
    /// Resolves the credential from configuration, generating one if absent.
    ///
    /// A blank configured value counts as absent. A generated credential is
    /// emitted exactly once on the `credential` log target so the operator
    /// can hand it to clients; it is never logged anywhere else.
    #[must_use]
    pub fn resolve(configured: Option<&str>) -> Self {
        if let Some(secret) = configured.filter(|s| !s.trim().is_empty()) {
            return Self::from_secret(secret);
        }

        let (store, secret) = Self::generate();
        warn!(
            target: "credential",
            api_key = %secret,
            "no MCP_API_KEY configured; generated a key for this process (set MCP_API_KEY to use a fixed key)"
        );
        store
    }

    /// Builds a store from a configured secret.
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        Self {
            digest: digest(secret),
            source: CredentialSource::Configured,
        }
    }

    /// Generates a random credential, returning the store and the plaintext.
    ///
    /// The plaintext is returned only so the caller can surface it once.
    #[must_use]
    pub fn generate() -> (Self, String) {
        let bytes: [u8; GENERATED_KEY_BYTES] = rand::random();
        let secret = URL_SAFE_NO_PAD.encode(bytes);
        let store = Self {
            digest: digest(&secret),
            source: CredentialSource::Generated,
        };
        (store, secret)
    }

    /// Checks a candidate credential in constant time.
    ///
    /// An empty candidate never matches.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        digest(candidate).ct_eq(&self.digest).into()
    }

    #[must_use]
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Short hex prefix of the digest, safe to log for correlating restarts.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..FINGERPRINT_BYTES])
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}
