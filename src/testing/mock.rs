//! In-memory collaborators for isolated tests
//!
//! Every mock records how it was called so tests can assert on the traffic
//! the bridge or guardian produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use url::Url;

use crate::authentication::{
    DataStoreClient, IdentityProviderClient, Navigator, SecretStore, SessionEndpoint,
    SettingsStore,
};
use crate::couch::{make_cookie_at, DataStoreError, SessionProbe, SessionReply};
use crate::error::BridgeError;
use crate::models::{UserCtx, UserDoc};
use crate::oauth::jwt_validation::IdTokenClaims;
use crate::oauth::provider::{OidcDiscoveryDocument, ProviderConfig};
use crate::oauth::{
    AuthorizationParams, ExchangeParams, HttpIdentityProviderClient, OidcClientError, TokenSet,
};
use crate::settings::{AppSettings, OidcProviderSettings};
use crate::testing::fixtures::{discovery_document, TEST_CLIENT_ID, TEST_ISSUER};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Settings and secrets
// ============================================================================

#[derive(Default)]
pub struct MockSettingsStore {
    settings: Mutex<AppSettings>,
    calls: AtomicU32,
}

impl MockSettingsStore {
    /// Settings with an `oidc_provider` block for [`TEST_CLIENT_ID`]
    #[must_use]
    pub fn configured(discovery_url: &str) -> Self {
        let store = Self::default();
        store.set_provider(Some(OidcProviderSettings {
            discovery_url: discovery_url.to_string(),
            client_id: TEST_CLIENT_ID.to_string(),
        }));
        store
    }

    /// Settings without an `oidc_provider` block
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn set_provider(&self, provider: Option<OidcProviderSettings>) {
        lock(&self.settings).oidc_provider = provider;
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for MockSettingsStore {
    async fn get_settings(&self) -> Result<AppSettings, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.settings).clone())
    }
}

#[derive(Default)]
pub struct MockSecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MockSecretStore {
    #[must_use]
    pub fn with(key: &str, value: &str) -> Self {
        let store = Self::default();
        lock(&store.secrets).insert(key.to_string(), value.to_string());
        store
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn get_credential(&self, key: &str) -> Result<Option<String>, BridgeError> {
        Ok(lock(&self.secrets).get(key).cloned())
    }
}

// ============================================================================
// Identity provider
// ============================================================================

/// How the mock provider answers a token exchange
#[derive(Debug, Clone)]
pub enum MockExchange {
    /// Validated tokens carrying these claims
    Tokens(IdTokenClaims),
    /// Tokens without an ID token
    NoIdToken,
    /// The token endpoint refuses the code
    Reject(String),
}

pub struct MockIdentityProvider {
    metadata: Mutex<OidcDiscoveryDocument>,
    discovery_failures: AtomicU32,
    discover_calls: AtomicU32,
    exchange: Mutex<MockExchange>,
    exchanges: Mutex<Vec<(Url, ExchangeParams)>>,
    authorizations: Mutex<Vec<AuthorizationParams>>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new(discovery_document(TEST_ISSUER))
    }
}

impl MockIdentityProvider {
    #[must_use]
    pub fn new(metadata: OidcDiscoveryDocument) -> Self {
        Self {
            metadata: Mutex::new(metadata),
            discovery_failures: AtomicU32::new(0),
            discover_calls: AtomicU32::new(0),
            exchange: Mutex::new(MockExchange::Tokens(Self::claims_for("ari"))),
            exchanges: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
        }
    }

    /// A provider that does not advertise PKCE support
    #[must_use]
    pub fn without_pkce() -> Self {
        let mut metadata = discovery_document(TEST_ISSUER);
        metadata.code_challenge_methods_supported.clear();
        Self::new(metadata)
    }

    #[must_use]
    pub fn claims_for(username: &str) -> IdTokenClaims {
        IdTokenClaims {
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(Value::String(TEST_CLIENT_ID.to_string())),
            sub: Some(format!("sub-{username}")),
            name: Some("Test User".to_string()),
            preferred_username: Some(username.to_string()),
            email: Some(format!("{username}@test")),
            ..Default::default()
        }
    }

    /// Fail the next `count` discovery attempts
    pub fn fail_discovery(&self, count: u32) {
        self.discovery_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_metadata(&self, metadata: OidcDiscoveryDocument) {
        *lock(&self.metadata) = metadata;
    }

    pub fn respond_with(&self, exchange: MockExchange) {
        *lock(&self.exchange) = exchange;
    }

    #[must_use]
    pub fn discover_calls(&self) -> u32 {
        self.discover_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn authorizations(&self) -> Vec<AuthorizationParams> {
        lock(&self.authorizations).clone()
    }

    #[must_use]
    pub fn exchanges(&self) -> Vec<(Url, ExchangeParams)> {
        lock(&self.exchanges).clone()
    }
}

#[async_trait]
impl IdentityProviderClient for MockIdentityProvider {
    async fn discover(
        &self,
        _discovery_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<ProviderConfig, OidcClientError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .discovery_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OidcClientError::Discovery("connection refused".to_string()));
        }

        Ok(ProviderConfig::new(
            lock(&self.metadata).clone(),
            client_id,
            client_secret,
        ))
    }

    fn build_authorization_url(
        &self,
        config: &ProviderConfig,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcClientError> {
        lock(&self.authorizations).push(params.clone());
        HttpIdentityProviderClient::default().build_authorization_url(config, params)
    }

    async fn exchange_code(
        &self,
        _config: &ProviderConfig,
        callback_url: &Url,
        params: &ExchangeParams,
    ) -> Result<TokenSet, OidcClientError> {
        lock(&self.exchanges).push((callback_url.clone(), params.clone()));

        let query: HashMap<String, String> = callback_url.query_pairs().into_owned().collect();
        if let Some(error) = query.get("error") {
            return Err(OidcClientError::Provider(error.clone()));
        }
        if !query.contains_key("code") {
            return Err(OidcClientError::InvalidCallback("missing code".to_string()));
        }

        match lock(&self.exchange).clone() {
            MockExchange::Tokens(claims) => Ok(TokenSet {
                access_token: Some("mock-access-token".to_string()),
                id_token: Some("mock.id.token".to_string()),
                claims: Some(claims),
            }),
            MockExchange::NoIdToken if params.id_token_expected => {
                Err(OidcClientError::MissingIdToken)
            }
            MockExchange::NoIdToken => Ok(TokenSet {
                access_token: Some("mock-access-token".to_string()),
                ..Default::default()
            }),
            MockExchange::Reject(reason) => Err(OidcClientError::GrantRejected(reason)),
        }
    }
}

// ============================================================================
// Data store
// ============================================================================

/// In-memory CouchDB that validates `AuthSession` cookies the way the real
/// cookie handler does: recompute from secret, salt and embedded expiry.
#[derive(Default)]
pub struct MockDataStore {
    config: Mutex<HashMap<String, Value>>,
    users: Mutex<HashMap<String, UserDoc>>,
    session_override: Mutex<Option<SessionReply>>,
    checked_cookies: Mutex<Vec<String>>,
    deleted_sessions: AtomicU32,
}

impl MockDataStore {
    /// A store whose secret is `secret` and that knows `username` with `salt`
    #[must_use]
    pub fn with_user(username: &str, salt: &str, secret: &str) -> Self {
        let store = Self::default();
        store.set_config("secret", Value::String(secret.to_string()));
        store.add_user(username, salt, &[]);
        store
    }

    pub fn add_user(&self, username: &str, salt: &str, roles: &[&str]) {
        lock(&self.users).insert(
            username.to_string(),
            UserDoc {
                name: Some(username.to_string()),
                salt: Some(salt.to_string()),
                roles: roles.iter().map(ToString::to_string).collect(),
            },
        );
    }

    /// Set a `couch_httpd_auth` config value
    pub fn set_config(&self, key: &str, value: Value) {
        lock(&self.config).insert(key.to_string(), value);
    }

    pub fn remove_config(&self, key: &str) {
        lock(&self.config).remove(key);
    }

    /// Answer every session check with `reply` instead of validating
    pub fn set_session_reply(&self, reply: SessionReply) {
        *lock(&self.session_override) = Some(reply);
    }

    #[must_use]
    pub fn checked_cookies(&self) -> Vec<String> {
        lock(&self.checked_cookies).clone()
    }

    #[must_use]
    pub fn deleted_sessions(&self) -> u32 {
        self.deleted_sessions.load(Ordering::SeqCst)
    }

    fn validate_cookie(&self, cookie: &str) -> SessionProbe {
        let Some((username, expiry)) = URL_SAFE_NO_PAD
            .decode(cookie)
            .ok()
            .and_then(|bytes| {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let mut parts = text.splitn(3, ':');
                let username = parts.next()?.to_string();
                let expiry = u64::from_str_radix(parts.next()?, 16).ok()?;
                Some((username, expiry))
            })
        else {
            return anonymous();
        };

        let secret = lock(&self.config)
            .get("secret")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let user = lock(&self.users).get(&username).cloned();

        let (Some(secret), Some(user)) = (secret, user) else {
            return anonymous();
        };
        let Some(salt) = user.salt else {
            return anonymous();
        };

        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let expected = make_cookie_at(&username, &salt, &secret, 0, expiry).ok();
        if expiry <= now || expected.as_deref() != Some(cookie) {
            return anonymous();
        }

        SessionProbe::Authenticated(UserCtx {
            name: Some(username),
            roles: user.roles,
        })
    }
}

/// CouchDB answers an unrecognised cookie with 200 and a null name
fn anonymous() -> SessionProbe {
    SessionProbe::Authenticated(UserCtx::default())
}

#[async_trait]
impl DataStoreClient for MockDataStore {
    async fn get_config_value(
        &self,
        _section: &str,
        key: &str,
    ) -> Result<Option<Value>, DataStoreError> {
        Ok(lock(&self.config).get(key).cloned())
    }

    async fn get_user_doc(&self, username: &str) -> Result<Option<UserDoc>, DataStoreError> {
        Ok(lock(&self.users).get(username).cloned())
    }

    async fn check_session(&self, cookie: Option<&str>) -> SessionReply {
        if let Some(cookie) = cookie {
            lock(&self.checked_cookies).push(cookie.to_string());
        }

        if let Some(reply) = lock(&self.session_override).clone() {
            return reply;
        }

        match cookie {
            Some(cookie) => self.validate_cookie(cookie).into(),
            None => anonymous().into(),
        }
    }

    async fn delete_session(&self, _cookie: Option<&str>) -> Result<(), DataStoreError> {
        self.deleted_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Session Guardian collaborators
// ============================================================================

pub struct MockSessionEndpoint {
    probe: Mutex<SessionProbe>,
    probe_calls: AtomicU32,
    terminate_calls: AtomicU32,
    fail_terminate: AtomicBool,
}

impl MockSessionEndpoint {
    #[must_use]
    pub fn new(probe: SessionProbe) -> Self {
        Self {
            probe: Mutex::new(probe),
            probe_calls: AtomicU32::new(0),
            terminate_calls: AtomicU32::new(0),
            fail_terminate: AtomicBool::new(false),
        }
    }

    pub fn set_probe(&self, probe: SessionProbe) {
        *lock(&self.probe) = probe;
    }

    pub fn fail_terminate(&self) {
        self.fail_terminate.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn terminate_calls(&self) -> u32 {
        self.terminate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionEndpoint for MockSessionEndpoint {
    async fn probe(&self) -> SessionProbe {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.probe).clone()
    }

    async fn terminate(&self) -> Result<(), DataStoreError> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminate.load(Ordering::SeqCst) {
            Err(DataStoreError::Unreachable("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Navigator that records every location replacement
pub struct RecordingNavigator {
    current: String,
    replaced: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new(current_url: &str) -> Self {
        Self {
            current: current_url.to_string(),
            replaced: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn replaced(&self) -> Vec<String> {
        lock(&self.replaced).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_url(&self) -> String {
        self.current.clone()
    }

    fn replace(&self, url: &str) {
        lock(&self.replaced).push(url.to_string());
    }
}
