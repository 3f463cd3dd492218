//! Session Guardian
//!
//! Keeps the client-held identity consistent with the data store's live
//! session. Only an explicit rejection or a confirmed identity mismatch leads
//! to logout; an unreachable store is treated as transient and left alone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::authentication::{DataStoreClient, IdentityCache, Navigator, SessionEndpoint};
use crate::couch::{DataStoreError, SessionProbe};
use crate::models::ClientIdentity;

/// What a session check found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// Remote and local identity agree
    Valid,
    /// No usable answer from the store; nothing was done
    Unreachable,
    /// The store no longer recognises the session; identity cleared
    Expired,
    /// The store reports a different user; logged out
    Mismatch,
    /// Nothing cached locally; logged out without probing
    NoLocalIdentity,
}

pub struct SessionGuardian {
    db_name: String,
    identity: Arc<dyn IdentityCache>,
    endpoint: Arc<dyn SessionEndpoint>,
    navigator: Arc<dyn Navigator>,
}

impl SessionGuardian {
    #[must_use]
    pub fn new(
        db_name: &str,
        identity: Arc<dyn IdentityCache>,
        endpoint: Arc<dyn SessionEndpoint>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            db_name: db_name.to_string(),
            identity,
            endpoint,
            navigator,
        }
    }

    /// `/{db}/login?redirect=<current>[&username=<name>]`, values percent-encoded
    #[must_use]
    pub fn login_url(&self, username: Option<&str>) -> String {
        let current = self.navigator.current_url();
        let mut url = format!(
            "/{}/login?redirect={}",
            self.db_name,
            urlencoding::encode(&current)
        );
        if let Some(username) = username {
            url.push_str("&username=");
            url.push_str(&urlencoding::encode(username));
        }
        url
    }

    fn local_username(&self) -> Option<String> {
        self.identity
            .load()
            .and_then(|identity| identity.username().map(ToString::to_string))
    }

    fn navigate_to_login(&self, username: Option<&str>) {
        let url = self.login_url(username);
        debug!("↪️ Replacing location with {url}");
        self.navigator.replace(&url);
    }

    /// Reconcile the cached identity with the live session
    pub async fn check_current_session(&self) -> SessionCheck {
        let Some(local_name) = self.local_username() else {
            info!("🔒 No cached identity, logging out");
            self.logout().await;
            return SessionCheck::NoLocalIdentity;
        };

        match self.endpoint.probe().await {
            SessionProbe::Unreachable => {
                debug!("Session endpoint unreachable, keeping session");
                SessionCheck::Unreachable
            }
            SessionProbe::Unexpected(status) => {
                warn!("⚠️ Session endpoint answered {status}, keeping session");
                SessionCheck::Unreachable
            }
            SessionProbe::Unauthenticated => {
                info!("🔒 Session for {local_name} has expired");
                self.identity.clear();
                self.navigate_to_login(Some(local_name.as_str()));
                SessionCheck::Expired
            }
            SessionProbe::Authenticated(remote)
                if remote.name.as_deref() == Some(local_name.as_str()) =>
            {
                SessionCheck::Valid
            }
            SessionProbe::Authenticated(remote) => {
                warn!(
                    "⚠️ Session belongs to {:?}, not {local_name}; logging out",
                    remote.name.as_deref().unwrap_or("<anonymous>")
                );
                self.logout().await;
                SessionCheck::Mismatch
            }
        }
    }

    /// Clear the identity, end the remote session, go to the login page
    pub async fn logout(&self) {
        let username = self.local_username();
        self.identity.clear();

        if let Err(e) = self.endpoint.terminate().await {
            warn!("⚠️ Failed to delete session: {e}");
        }

        self.navigate_to_login(username.as_deref());
    }

    /// True only if the cached identity holds the literal `_admin` role
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.identity
            .load()
            .is_some_and(|identity| identity.is_admin())
    }

    /// Re-run the session check every `period` until the handle is aborted
    pub fn watch(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let outcome = self.check_current_session().await;
                debug!("Periodic session check: {outcome:?}");
            }
        })
    }
}

/// Identity held in process memory, seeded from a `userCtx` cookie
#[derive(Debug, Default)]
pub struct InMemoryIdentityCache {
    identity: Mutex<Option<ClientIdentity>>,
}

impl InMemoryIdentityCache {
    #[must_use]
    pub fn new(identity: Option<ClientIdentity>) -> Self {
        Self {
            identity: Mutex::new(identity),
        }
    }

    #[must_use]
    pub fn from_cookie_value(value: &str) -> Self {
        Self::new(ClientIdentity::from_cookie_value(value))
    }

    fn lock(&self) -> MutexGuard<'_, Option<ClientIdentity>> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityCache for InMemoryIdentityCache {
    fn load(&self) -> Option<ClientIdentity> {
        self.lock().clone()
    }

    fn clear(&self) {
        self.lock().take();
    }
}

/// The data store's `_session` endpoint as seen by one client
pub struct CouchSessionEndpoint {
    store: Arc<dyn DataStoreClient>,
    cookie: Option<String>,
}

impl CouchSessionEndpoint {
    #[must_use]
    pub fn new(store: Arc<dyn DataStoreClient>, cookie: Option<String>) -> Self {
        Self { store, cookie }
    }
}

#[async_trait]
impl SessionEndpoint for CouchSessionEndpoint {
    async fn probe(&self) -> SessionProbe {
        self.store.check_session(self.cookie.as_deref()).await.probe
    }

    async fn terminate(&self) -> Result<(), DataStoreError> {
        self.store.delete_session(self.cookie.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserCtx;
    use crate::testing::mock::{MockSessionEndpoint, RecordingNavigator};

    const CURRENT_URL: &str = "http://cht.test/medic/_design/medic/_rewrite/#/messages";

    struct Harness {
        identity: Arc<InMemoryIdentityCache>,
        endpoint: Arc<MockSessionEndpoint>,
        navigator: Arc<RecordingNavigator>,
        guardian: SessionGuardian,
    }

    fn harness(identity: Option<ClientIdentity>, probe: SessionProbe) -> Harness {
        let identity = Arc::new(InMemoryIdentityCache::new(identity));
        let endpoint = Arc::new(MockSessionEndpoint::new(probe));
        let navigator = Arc::new(RecordingNavigator::new(CURRENT_URL));
        let guardian = SessionGuardian::new(
            "medic",
            Arc::clone(&identity) as Arc<dyn IdentityCache>,
            Arc::clone(&endpoint) as Arc<dyn SessionEndpoint>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        );
        Harness {
            identity,
            endpoint,
            navigator,
            guardian,
        }
    }

    fn encoded_current() -> String {
        urlencoding::encode(CURRENT_URL).into_owned()
    }

    fn remote(name: &str) -> SessionProbe {
        SessionProbe::Authenticated(UserCtx {
            name: Some(name.to_string()),
            roles: vec![],
        })
    }

    #[tokio::test]
    async fn test_expired_session_redirects_with_username() {
        let h = harness(
            Some(ClientIdentity::new("adam", &[])),
            SessionProbe::Unauthenticated,
        );

        assert_eq!(h.guardian.check_current_session().await, SessionCheck::Expired);
        assert_eq!(h.identity.load(), None);
        assert_eq!(h.endpoint.terminate_calls(), 0);
        assert_eq!(
            h.navigator.replaced(),
            vec![format!("/medic/login?redirect={}&username=adam", encoded_current())]
        );
    }

    #[tokio::test]
    async fn test_no_local_identity_logs_out_without_probe() {
        let h = harness(None, remote("adam"));

        assert_eq!(
            h.guardian.check_current_session().await,
            SessionCheck::NoLocalIdentity
        );
        assert_eq!(h.endpoint.probe_calls(), 0);
        assert_eq!(h.endpoint.terminate_calls(), 1);
        assert_eq!(
            h.navigator.replaced(),
            vec![format!("/medic/login?redirect={}", encoded_current())]
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_takes_no_action() {
        let h = harness(
            Some(ClientIdentity::new("adam", &[])),
            SessionProbe::Unreachable,
        );

        assert_eq!(
            h.guardian.check_current_session().await,
            SessionCheck::Unreachable
        );
        assert!(h.identity.load().is_some());
        assert!(h.navigator.replaced().is_empty());
        assert_eq!(h.endpoint.terminate_calls(), 0);
    }

    #[tokio::test]
    async fn test_server_error_takes_no_action() {
        let h = harness(
            Some(ClientIdentity::new("adam", &[])),
            SessionProbe::Unexpected(500),
        );

        assert_eq!(
            h.guardian.check_current_session().await,
            SessionCheck::Unreachable
        );
        assert!(h.identity.load().is_some());
        assert!(h.navigator.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_outage_then_expiry() {
        let h = harness(
            Some(ClientIdentity::new("adam", &[])),
            SessionProbe::Unreachable,
        );
        assert_eq!(
            h.guardian.check_current_session().await,
            SessionCheck::Unreachable
        );

        h.endpoint.set_probe(remote("adam"));
        assert_eq!(h.guardian.check_current_session().await, SessionCheck::Valid);

        h.endpoint.set_probe(SessionProbe::Unauthenticated);
        assert_eq!(h.guardian.check_current_session().await, SessionCheck::Expired);
        assert_eq!(h.endpoint.probe_calls(), 3);
        assert_eq!(h.navigator.replaced().len(), 1);
    }

    #[tokio::test]
    async fn test_identity_mismatch_forces_logout() {
        let h = harness(Some(ClientIdentity::new("bryan", &[])), remote("jimmy"));

        assert_eq!(h.guardian.check_current_session().await, SessionCheck::Mismatch);
        assert_eq!(h.identity.load(), None);
        assert_eq!(h.endpoint.terminate_calls(), 1);
        assert_eq!(
            h.navigator.replaced(),
            vec![format!("/medic/login?redirect={}&username=bryan", encoded_current())]
        );
    }

    #[tokio::test]
    async fn test_matching_identity_takes_no_action() {
        let h = harness(Some(ClientIdentity::new("bryan", &[])), remote("bryan"));

        assert_eq!(h.guardian.check_current_session().await, SessionCheck::Valid);
        assert!(h.identity.load().is_some());
        assert!(h.navigator.replaced().is_empty());
        assert_eq!(h.endpoint.terminate_calls(), 0);
    }

    #[tokio::test]
    async fn test_logout_navigates_even_if_delete_fails() {
        let h = harness(Some(ClientIdentity::new("adam", &[])), remote("adam"));
        h.endpoint.fail_terminate();

        h.guardian.logout().await;

        assert_eq!(h.identity.load(), None);
        assert_eq!(h.endpoint.terminate_calls(), 1);
        assert_eq!(h.navigator.replaced().len(), 1);
    }

    #[test]
    fn test_is_admin() {
        for (roles, expected) in [
            (vec!["_admin"], true),
            (vec!["chw", "_admin"], true),
            (vec![], false),
            (vec!["national_admin"], false),
            (vec!["district_admin", "x"], false),
        ] {
            let h = harness(
                Some(ClientIdentity::new("adam", &roles)),
                SessionProbe::Unreachable,
            );
            assert_eq!(h.guardian.is_admin(), expected, "{roles:?}");
        }

        assert!(!harness(None, SessionProbe::Unreachable).guardian.is_admin());
    }

    #[test]
    fn test_login_url_encodes_values() {
        let h = harness(None, SessionProbe::Unreachable);
        assert_eq!(
            h.guardian.login_url(Some("ari b&c")),
            format!("/medic/login?redirect={}&username=ari%20b%26c", encoded_current())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_rechecks_periodically() {
        let h = harness(
            Some(ClientIdentity::new("adam", &[])),
            SessionProbe::Unreachable,
        );
        let endpoint = Arc::clone(&h.endpoint);
        let handle = Arc::new(h.guardian).watch(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(95)).await;
        handle.abort();

        assert_eq!(endpoint.probe_calls(), 3);
    }
}
