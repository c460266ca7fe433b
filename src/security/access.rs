//! Shared-secret access guard.
//!
//! The credential is fixed for the process lifetime. Comparison is
//! constant-time and the secret is never formatted in full: `Debug` and
//! [`Credential::masked`] show at most a short prefix.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Header carrying the credential on upgrades and protected endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Number of random bytes in a generated credential.
const GENERATED_KEY_BYTES: usize = 32;

/// The process-wide shared secret.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wraps an externally supplied secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Generates a random URL-safe secret.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// The first four characters followed by an ellipsis.
    #[must_use]
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}…")
    }

    /// The full secret. Only for handing to the operator once at startup.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// 32 bytes from the OS RNG, base64url without padding.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; GENERATED_KEY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validates presented credentials against the configured one.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    credential: Credential,
}

impl AccessGuard {
    /// Creates a guard for `credential`.
    #[must_use]
    pub const fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// True iff `presented` is non-empty and equals the credential.
    #[must_use]
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented.filter(|p| !p.is_empty()) else {
            return false;
        };
        let expected = self.credential.0.as_bytes();
        // ct_eq on slices of unequal length returns false without comparing contents.
        expected.ct_eq(presented.as_bytes()).into()
    }

    /// Checks the `X-API-Key` header of a request.
    #[must_use]
    pub fn authorize_headers(&self, headers: &HeaderMap) -> bool {
        self.authorize(presented_credential(headers))
    }
}

/// Extracts the credential header, if present and valid UTF-8.
#[must_use]
pub fn presented_credential(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}
