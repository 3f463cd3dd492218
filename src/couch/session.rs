//! Turns a federated identity into a native CouchDB session

use std::sync::Arc;

use log::{debug, info, warn};

use crate::authentication::DataStoreClient;
use crate::couch::client::{parse_timeout, DataStoreError, SessionProbe};
use crate::couch::cookie::make_cookie;
use crate::error::{AuthFailure, BridgeError};
use crate::models::UserCtx;

const AUTH_CONFIG_SECTION: &str = "couch_httpd_auth";

/// A session the data store has confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedSession {
    /// `AuthSession` cookie value to hand to the client
    pub cookie: String,
    pub user_ctx: UserCtx,
    pub auth_timeout_seconds: u64,
}

pub struct SessionEstablisher {
    store: Arc<dyn DataStoreClient>,
    default_auth_timeout_seconds: u64,
}

impl SessionEstablisher {
    #[must_use]
    pub fn new(store: Arc<dyn DataStoreClient>, default_auth_timeout_seconds: u64) -> Self {
        Self {
            store,
            default_auth_timeout_seconds,
        }
    }

    /// Synthesize a cookie for `username` and confirm the store honors it.
    ///
    /// Every call fetches the secret, salt and timeout afresh. The session
    /// check is not retried.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The store secret is not set (`Configuration`)
    /// - The user does not exist or has no salt (`UnknownUser`)
    /// - The session check is not a 200 for this user (`SessionRejected`)
    /// - The store cannot be reached (`TransientNetwork`)
    pub async fn establish(&self, username: &str) -> Result<EstablishedSession, BridgeError> {
        let secret = self.fetch_secret().await?;
        let salt = self.fetch_salt(username).await?;
        let timeout = self.fetch_timeout().await?;

        let cookie = make_cookie(username, &salt, &secret, timeout)
            .map_err(|e| BridgeError::Configuration(format!("Unable to sign session: {e}")))?;

        let reply = self.store.check_session(Some(&cookie)).await;
        let user_ctx = match reply.probe {
            SessionProbe::Authenticated(ctx) if ctx.name.as_deref() == Some(username) => ctx,
            SessionProbe::Authenticated(ctx) => {
                warn!(
                    "❌ Session check for {username} answered as {:?}",
                    ctx.name.as_deref().unwrap_or("<anonymous>")
                );
                return Err(AuthFailure::SessionRejected { status: 200 }.into());
            }
            SessionProbe::Unauthenticated => {
                return Err(AuthFailure::SessionRejected { status: 401 }.into());
            }
            SessionProbe::Unexpected(status) => {
                return Err(AuthFailure::SessionRejected { status }.into());
            }
            SessionProbe::Unreachable => {
                return Err(BridgeError::TransientNetwork(
                    "session check received no response".to_string(),
                ));
            }
        };

        info!("🍪 Native session established for {username}");
        Ok(EstablishedSession {
            cookie: reply.refreshed_cookie.unwrap_or(cookie),
            user_ctx,
            auth_timeout_seconds: timeout,
        })
    }

    async fn fetch_secret(&self) -> Result<String, BridgeError> {
        let secret = self
            .store
            .get_config_value(AUTH_CONFIG_SECTION, "secret")
            .await
            .map_err(store_error)?;

        secret
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| BridgeError::Configuration("CouchDB secret has not been set".to_string()))
    }

    async fn fetch_salt(&self, username: &str) -> Result<String, BridgeError> {
        let user_doc = self
            .store
            .get_user_doc(username)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AuthFailure::UnknownUser(username.to_string()))?;

        user_doc
            .salt
            .filter(|salt| !salt.is_empty())
            .ok_or_else(|| AuthFailure::UnknownUser(format!("{username} has no password salt")).into())
    }

    async fn fetch_timeout(&self) -> Result<u64, BridgeError> {
        let value = self
            .store
            .get_config_value(AUTH_CONFIG_SECTION, "timeout")
            .await
            .map_err(store_error)?;

        match value.as_ref().and_then(parse_timeout) {
            Some(timeout) => {
                debug!("Session timeout is {timeout}s");
                Ok(timeout)
            }
            None => {
                warn!(
                    "⚠️ No usable {AUTH_CONFIG_SECTION}/timeout, using {}s",
                    self.default_auth_timeout_seconds
                );
                Ok(self.default_auth_timeout_seconds)
            }
        }
    }
}

fn store_error(e: DataStoreError) -> BridgeError {
    match e {
        DataStoreError::Unreachable(msg) => BridgeError::TransientNetwork(msg),
        other => BridgeError::Configuration(other.to_string()),
    }
}
