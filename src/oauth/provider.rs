//! Discovered identity-provider configuration and its owned cache

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::oauth::pkce::CODE_CHALLENGE_METHOD;

/// OIDC discovery document (`.well-known/openid-configuration`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// A discovered provider plus the client credentials registered with it.
/// Immutable once built; replaced wholesale on reload.
#[derive(Clone)]
pub struct ProviderConfig {
    pub metadata: OidcDiscoveryDocument,
    pub client_id: String,
    client_secret: String,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(metadata: OidcDiscoveryDocument, client_id: &str, client_secret: &str) -> Self {
        Self {
            metadata,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.metadata.issuer
    }

    /// True when the provider advertises the `S256` challenge method
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.metadata
            .code_challenge_methods_supported
            .iter()
            .any(|method| method == CODE_CHALLENGE_METHOD)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("metadata", &self.metadata)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Holds the current provider configuration, if any.
///
/// Readers get an `Arc` snapshot and never observe a half-written config.
#[derive(Debug, Default)]
pub struct ProviderConfigCache {
    current: RwLock<Option<Arc<ProviderConfig>>>,
}

impl ProviderConfigCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Arc<ProviderConfig>> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, config: ProviderConfig) -> Arc<ProviderConfig> {
        let config = Arc::new(config);
        *self.current.write().await = Some(Arc::clone(&config));
        config
    }

    pub async fn clear(&self) {
        self.current.write().await.take();
    }
}
