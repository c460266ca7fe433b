//! On-disk persistence of the WHOOP OAuth token.
//!
//! The token is written by the OAuth callback and read by every data tool.
//! The raw provider response is stored as-is so that fields we do not model
//! survive a round trip.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from reading or writing the token file.
///
/// None of the variants include token material.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// The file exists but could not be read or written.
    #[error("token file I/O failed: {path}")]
    Io {
        /// Token file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid token document.
    #[error("token file is corrupted: {path}")]
    Corrupt {
        /// Token file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A token response was missing `access_token`.
    #[error("token response has no access_token")]
    MissingAccessToken,
}

/// The fields of a stored token the service cares about.
#[derive(Clone, Deserialize)]
pub struct StoredToken {
    /// Bearer token for the WHOOP API.
    pub access_token: String,
    /// Usually "bearer".
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds at issue time.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

impl StoredToken {
    /// Parses a token from a provider response or file contents.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError::MissingAccessToken`] if the document has no
    /// usable `access_token`.
    pub fn from_value(value: &Value) -> Result<Self, TokenStoreError> {
        let token: Self = serde_json::from_value(value.clone())
            .map_err(|_| TokenStoreError::MissingAccessToken)?;
        if token.access_token.is_empty() {
            return Err(TokenStoreError::MissingAccessToken);
        }
        Ok(token)
    }
}

/// Reads and writes the token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the token. `Ok(None)` means nobody has authenticated yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a token document.
    pub async fn load(&self) -> Result<Option<StoredToken>, TokenStoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TokenStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| TokenStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Persists a raw token response.
    ///
    /// # Errors
    ///
    /// Returns an error if the response has no access token or the file
    /// cannot be written.
    pub async fn save(&self, raw: &Value) -> Result<StoredToken, TokenStoreError> {
        let token = StoredToken::from_value(raw)?;
        let io_err = |source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        };

        let contents = serde_json::to_vec(raw).map_err(|source| TokenStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await.map_err(io_err)?;

        // `mode` only applies on creation; tighten a file left by an older run.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_err)?;
        }

        file.write_all(&contents).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        let raw = json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600,
            "extra": "kept"
        });
        store.save(&raw).await.unwrap();

        let token = store.load().await.unwrap().unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, Some(3600));

        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk["extra"], "kept");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_token_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = TokenStore::new(&path);
        store.save(&json!({"access_token": "tok"})).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = TokenStore::new(dir.path().join("fresh.json"));
        fresh.save(&json!({"access_token": "tok"})).await.unwrap();
        let mode = std::fs::metadata(fresh.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn save_requires_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let err = store.save(&json!({"token_type": "bearer"})).await.unwrap_err();
        assert!(matches!(err, TokenStoreError::MissingAccessToken));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{ nope").unwrap();

        let err = TokenStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TokenStoreError::Corrupt { .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let token = StoredToken::from_value(&json!({
            "access_token": "very-secret",
            "refresh_token": "also-secret"
        }))
        .unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
    }
}
