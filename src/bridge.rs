//! The OIDC → CouchDB SSO bridge
//!
//! Owns the provider configuration and the in-flight authorization attempts,
//! and drives one login from authorization redirect to confirmed session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use url::Url;

use crate::authentication::{DataStoreClient, IdentityProviderClient, SecretStore, SettingsStore};
use crate::couch::SessionEstablisher;
use crate::error::{AuthFailure, BridgeError, NOT_CONFIGURED_MESSAGE, SSO_UNAVAILABLE_MESSAGE};
use crate::models::{Claims, UserCtx, ADMIN_ROLE};
use crate::oauth::pkce::{code_challenge, random_code_verifier};
use crate::oauth::{
    AuthorizationParams, ExchangeParams, IdTokenProcessor, OidcClientError,
    PendingAuthorization, PendingAuthorizations, ProviderConfig, ProviderConfigCache,
};
use crate::retry::RetryExecutor;
use crate::secrets::OIDC_CLIENT_SECRET_KEY;
use crate::settings::{BridgeSettings, OidcSettings};
use crate::utils::logging::LoggingHelper;
use crate::utils::redirect_validator::validate_return_to;

const OIDC_SCOPE: &str = "openid";

/// Tunables for the bridge
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub discovery_attempts: u32,
    pub retry_delay: Duration,
    pub pending_ttl: Duration,
    pub max_pending: usize,
    pub default_auth_timeout_seconds: u64,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

impl BridgeOptions {
    #[must_use]
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        let oidc: &OidcSettings = &settings.oidc;
        Self {
            discovery_attempts: oidc.discovery_attempts,
            retry_delay: oidc.retry_delay(),
            pending_ttl: oidc.pending_ttl(),
            max_pending: oidc.max_pending,
            default_auth_timeout_seconds: settings.couchdb.default_auth_timeout_seconds,
        }
    }
}

/// Everything the HTTP layer needs to finish a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// `AuthSession` cookie value
    pub cookie: String,
    pub auth_timeout_seconds: u64,
    pub user: Claims,
    pub user_ctx: UserCtx,
    pub redirect_target: String,
}

pub struct SsoBridge {
    settings_store: Arc<dyn SettingsStore>,
    secret_store: Arc<dyn SecretStore>,
    identity_provider: Arc<dyn IdentityProviderClient>,
    establisher: SessionEstablisher,
    provider: ProviderConfigCache,
    pending: PendingAuthorizations,
    retry: RetryExecutor,
    discovery_attempts: u32,
}

impl SsoBridge {
    #[must_use]
    pub fn new(
        settings_store: Arc<dyn SettingsStore>,
        secret_store: Arc<dyn SecretStore>,
        identity_provider: Arc<dyn IdentityProviderClient>,
        data_store: Arc<dyn DataStoreClient>,
        options: BridgeOptions,
    ) -> Self {
        Self {
            settings_store,
            secret_store,
            identity_provider,
            establisher: SessionEstablisher::new(data_store, options.default_auth_timeout_seconds),
            provider: ProviderConfigCache::new(),
            pending: PendingAuthorizations::new(options.pending_ttl, options.max_pending),
            retry: RetryExecutor::new(options.retry_delay),
            discovery_attempts: options.discovery_attempts,
        }
    }

    /// Current provider configuration, if discovery has succeeded
    pub async fn provider_config(&self) -> Option<Arc<ProviderConfig>> {
        self.provider.get().await
    }

    /// Discover the configured provider and store the result.
    ///
    /// Returns `Ok(None)` when settings carry no `oidc_provider` block; the
    /// stored configuration is cleared in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The client secret is missing (`Configuration`, naming the key)
    /// - Discovery still fails after the bounded retries (`ServiceUnavailable`)
    pub async fn init(&self) -> Result<Option<Arc<ProviderConfig>>, BridgeError> {
        let settings = self.settings_store.get_settings().await?;
        let Some(provider_settings) = settings.oidc_provider else {
            LoggingHelper::log_provider_not_configured();
            self.provider.clear().await;
            return Ok(None);
        };

        let Some(client_secret) = self
            .secret_store
            .get_credential(OIDC_CLIENT_SECRET_KEY)
            .await?
        else {
            LoggingHelper::log_missing_secret(OIDC_CLIENT_SECRET_KEY);
            return Err(BridgeError::Configuration(format!(
                "No OIDC client secret '{OIDC_CLIENT_SECRET_KEY}' configured."
            )));
        };

        LoggingHelper::log_discovery_start(&provider_settings.discovery_url);
        let config = self
            .retry
            .execute(
                || {
                    self.identity_provider.discover(
                        &provider_settings.discovery_url,
                        &provider_settings.client_id,
                        &client_secret,
                    )
                },
                self.discovery_attempts,
            )
            .await
            .map_err(|e| {
                LoggingHelper::log_provider_unreachable(
                    &provider_settings.discovery_url,
                    self.discovery_attempts,
                    &e.to_string(),
                );
                BridgeError::ServiceUnavailable(format!("{SSO_UNAVAILABLE_MESSAGE} {e}"))
            })?;

        LoggingHelper::log_provider_configured(config.issuer(), config.supports_pkce());
        Ok(Some(self.provider.replace(config).await))
    }

    /// Re-read settings and rediscover, replacing or clearing the configuration
    ///
    /// # Errors
    ///
    /// Same as [`SsoBridge::init`]; on error the previous configuration is kept
    pub async fn reload(&self) -> Result<Option<Arc<ProviderConfig>>, BridgeError> {
        debug!("🔄 Reloading OIDC provider configuration");
        self.init().await
    }

    async fn require_config(&self) -> Result<Arc<ProviderConfig>, BridgeError> {
        self.provider
            .get()
            .await
            .ok_or_else(|| BridgeError::Configuration(NOT_CONFIGURED_MESSAGE.to_string()))
    }

    /// Build the provider authorization URL for a new login attempt.
    ///
    /// `redirect_url` is this application's callback. `return_to` is where
    /// the user should land afterwards; values on another origin are dropped
    /// and same-origin absolute URLs are reduced to their path.
    ///
    /// # Errors
    ///
    /// Returns an error if OIDC is not configured or the provider metadata
    /// yields no valid authorization URL
    pub async fn build_authorization_redirect(
        &self,
        redirect_url: &str,
        return_to: Option<&str>,
    ) -> Result<Url, BridgeError> {
        let config = self.require_config().await?;
        let pkce = config.supports_pkce();

        let code_verifier = random_code_verifier();
        let code_challenge = pkce.then(|| code_challenge(&code_verifier));

        let state = self.pending.insert(PendingAuthorization {
            code_verifier,
            redirect_uri: redirect_url.to_string(),
            return_to: return_to.and_then(|target| validate_return_to(target, redirect_url)),
            created_at: Utc::now(),
        });

        LoggingHelper::log_login_started(redirect_url, pkce);
        self.identity_provider
            .build_authorization_url(
                &config,
                &AuthorizationParams {
                    redirect_uri: redirect_url.to_string(),
                    scope: OIDC_SCOPE.to_string(),
                    state,
                    code_challenge,
                },
            )
            .map_err(|e| BridgeError::Configuration(e.to_string()))
    }

    /// Exchange the callback's code, establish the native session and work
    /// out where to send the user.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - OIDC is not configured
    /// - The callback is malformed or its state is unknown or expired
    /// - The provider rejects the code or the ID token is invalid
    /// - The data store does not honor the synthesized session
    pub async fn complete_login(&self, callback_url: &Url) -> Result<LoginOutcome, BridgeError> {
        let config = self.require_config().await?;

        let state = callback_url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| AuthFailure::InvalidCallback("missing state".to_string()))?;

        let pending = self.pending.take(&state).ok_or_else(|| {
            AuthFailure::InvalidCallback("unknown or expired login attempt".to_string())
        })?;

        let pkce = config.supports_pkce();
        let tokens = self
            .identity_provider
            .exchange_code(
                &config,
                callback_url,
                &ExchangeParams {
                    redirect_uri: pending.redirect_uri,
                    state,
                    code_verifier: pkce.then_some(pending.code_verifier),
                    id_token_expected: pkce,
                },
            )
            .await
            .map_err(exchange_error)?;

        let exchange = IdTokenProcessor::process_token_set(tokens).map_err(exchange_error)?;
        let username = exchange.user.username.clone();

        let session = self.establisher.establish(&username).await.inspect_err(|e| {
            LoggingHelper::log_login_failure(&e.to_string());
        })?;

        LoggingHelper::log_login_success(&username);
        Ok(LoginOutcome {
            redirect_target: redirect_target(pending.return_to, &session.user_ctx),
            cookie: session.cookie,
            auth_timeout_seconds: session.auth_timeout_seconds,
            user: exchange.user,
            user_ctx: session.user_ctx,
        })
    }
}

fn exchange_error(e: OidcClientError) -> BridgeError {
    LoggingHelper::log_login_failure(&e.to_string());
    match e {
        OidcClientError::InvalidCallback(msg) => AuthFailure::InvalidCallback(msg).into(),
        other => AuthFailure::InvalidGrant(other.to_string()).into(),
    }
}

/// Captured local target, else the admin app for admins, else the root
fn redirect_target(return_to: Option<String>, user_ctx: &UserCtx) -> String {
    return_to.unwrap_or_else(|| {
        if user_ctx.roles.iter().any(|role| role == ADMIN_ROLE) {
            "/admin/".to_string()
        } else {
            "/".to_string()
        }
    })
}
