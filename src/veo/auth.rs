//! Access tokens for Vertex AI and Cloud Storage.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};

use super::error::VeoError;

/// OAuth scope covering Vertex AI and Cloud Storage.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Token endpoint written into service-account keys assembled from env vars.
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Source of bearer tokens for provider requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, VeoError>;
}

/// Service account credentials, either a key file or its two essential fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    File(PathBuf),
    Key {
        client_email: String,
        private_key: String,
    },
}

impl Credentials {
    /// Build key credentials from the raw environment values.
    ///
    /// Private keys pasted into `.env` files usually carry literal `\n`
    /// sequences; those are turned back into newlines.
    pub fn from_key_parts(client_email: &str, private_key: &str) -> Self {
        Credentials::Key {
            client_email: client_email.to_string(),
            private_key: private_key.replace("\\n", "\n"),
        }
    }

    /// Short human-readable description, never including key material.
    pub fn describe(&self) -> String {
        match self {
            Credentials::File(path) => format!("key file {}", path.display()),
            Credentials::Key { client_email, .. } => format!("service account {}", client_email),
        }
    }
}

/// Tokens minted from a service account. gcp_auth caches and refreshes them.
pub struct ServiceAccountTokens {
    provider: Arc<dyn TokenProvider>,
}

impl ServiceAccountTokens {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, VeoError> {
        let account = match credentials {
            Credentials::File(path) => CustomServiceAccount::from_file(path).map_err(|e| {
                VeoError::Configuration(format!(
                    "failed to load service account from '{}': {}",
                    path.display(),
                    e
                ))
            })?,
            Credentials::Key {
                client_email,
                private_key,
            } => {
                let key = serde_json::json!({
                    "type": "service_account",
                    "client_email": client_email,
                    "private_key": private_key,
                    "token_uri": GOOGLE_TOKEN_URI,
                });
                CustomServiceAccount::from_json(&key.to_string()).map_err(|e| {
                    VeoError::Configuration(format!("invalid service account key: {}", e))
                })?
            }
        };

        Ok(Self {
            provider: Arc::new(account),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, VeoError> {
        let token = self
            .provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| VeoError::Auth(format!("failed to obtain access token: {}", e)))?;
        Ok(token.as_str().to_string())
    }
}

/// A pre-issued bearer token, e.g. from `gcloud auth print-access-token`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Result<Self, VeoError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(VeoError::Configuration("access token is empty".to_string()));
        }
        Ok(Self(token))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, VeoError> {
        Ok(self.0.clone())
    }
}
