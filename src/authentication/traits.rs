//! Narrow interfaces to everything outside the bridge core

use async_trait::async_trait;
use url::Url;

use crate::couch::{DataStoreError, SessionProbe, SessionReply};
use crate::error::BridgeError;
use crate::models::{ClientIdentity, UserDoc};
use crate::oauth::{AuthorizationParams, ExchangeParams, OidcClientError, ProviderConfig, TokenSet};
use crate::settings::AppSettings;

/// Source of application settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings; called on every (re)initialisation
    ///
    /// # Errors
    /// Returns a configuration error if settings cannot be read
    async fn get_settings(&self) -> Result<AppSettings, BridgeError>;
}

/// Source of stored credentials
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Credential stored under `key`, or `None` when unset
    ///
    /// # Errors
    /// Returns a configuration error if the store cannot be read
    async fn get_credential(&self, key: &str) -> Result<Option<String>, BridgeError>;
}

/// OIDC relying-party operations against an identity provider
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Fetch provider metadata and bind it to the client credentials
    ///
    /// # Errors
    /// Returns an error if the discovery document cannot be fetched or parsed
    async fn discover(
        &self,
        discovery_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<ProviderConfig, OidcClientError>;

    /// Build the authorization endpoint URL; performs no I/O
    ///
    /// # Errors
    /// Returns an error if the provider's authorization endpoint is not a valid URL
    fn build_authorization_url(
        &self,
        config: &ProviderConfig,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcClientError>;

    /// Redeem the code carried by `callback_url` at the token endpoint
    ///
    /// # Errors
    /// Returns an error if:
    /// - The callback carries a provider error or no code
    /// - The callback `state` does not match
    /// - The token endpoint rejects the grant or cannot be reached
    /// - The ID token is missing when expected, or fails validation
    async fn exchange_code(
        &self,
        config: &ProviderConfig,
        callback_url: &Url,
        params: &ExchangeParams,
    ) -> Result<TokenSet, OidcClientError>;
}

/// HTTP access to the document store
#[async_trait]
pub trait DataStoreClient: Send + Sync {
    /// Node configuration value `section/key`; `None` if unset
    ///
    /// # Errors
    /// Returns an error if the store is unreachable or answers unexpectedly
    async fn get_config_value(
        &self,
        section: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DataStoreError>;

    /// The `_users` document for `username`; `None` if there is no such user
    ///
    /// # Errors
    /// Returns an error if the store is unreachable or answers unexpectedly
    async fn get_user_doc(&self, username: &str) -> Result<Option<UserDoc>, DataStoreError>;

    /// GET the session endpoint, presenting `cookie` as `AuthSession` when given
    async fn check_session(&self, cookie: Option<&str>) -> SessionReply;

    /// DELETE the session endpoint
    ///
    /// # Errors
    /// Returns an error if the store is unreachable or refuses
    async fn delete_session(&self, cookie: Option<&str>) -> Result<(), DataStoreError>;
}

/// Client-held copy of the session identity
pub trait IdentityCache: Send + Sync {
    fn load(&self) -> Option<ClientIdentity>;

    fn clear(&self);
}

/// The authoritative session as seen by the client
#[async_trait]
pub trait SessionEndpoint: Send + Sync {
    async fn probe(&self) -> SessionProbe;

    /// # Errors
    /// Returns an error if the session could not be terminated
    async fn terminate(&self) -> Result<(), DataStoreError>;
}

/// Client navigation
pub trait Navigator: Send + Sync {
    fn current_url(&self) -> String;

    /// Navigate to `url`, replacing the current history entry
    fn replace(&self, url: &str);
}
