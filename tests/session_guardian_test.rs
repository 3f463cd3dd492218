// Session Guardian wired to the data-store session endpoint
use std::sync::Arc;

use couch_sso_bridge::{
    authentication::{DataStoreClient, IdentityCache, Navigator, SessionEndpoint},
    couch::{make_cookie, SessionProbe},
    models::ClientIdentity,
    session::{CouchSessionEndpoint, InMemoryIdentityCache, SessionCheck, SessionGuardian},
    testing::{MockDataStore, RecordingNavigator},
};

const CURRENT_URL: &str = "https://cht.test/medic/_design/medic/_rewrite/#/reports";

struct Client {
    store: Arc<MockDataStore>,
    identity: Arc<InMemoryIdentityCache>,
    navigator: Arc<RecordingNavigator>,
    guardian: SessionGuardian,
}

/// A client holding `cookie` and the `userCtx` cookie value `user_ctx`
fn client(store: Arc<MockDataStore>, cookie: Option<String>, user_ctx: Option<&str>) -> Client {
    let identity = Arc::new(user_ctx.map_or_else(
        InMemoryIdentityCache::default,
        InMemoryIdentityCache::from_cookie_value,
    ));
    let navigator = Arc::new(RecordingNavigator::new(CURRENT_URL));
    let endpoint: Arc<dyn SessionEndpoint> = Arc::new(CouchSessionEndpoint::new(
        Arc::clone(&store) as Arc<dyn DataStoreClient>,
        cookie,
    ));
    let guardian = SessionGuardian::new(
        "medic",
        Arc::clone(&identity) as Arc<dyn IdentityCache>,
        endpoint,
        Arc::clone(&navigator) as Arc<dyn Navigator>,
    );

    Client {
        store,
        identity,
        navigator,
        guardian,
    }
}

fn user_ctx_cookie(name: &str, roles: &[&str]) -> String {
    ClientIdentity::new(name, roles).to_cookie_value().unwrap()
}

fn login_cookie(user: &str) -> String {
    make_cookie(user, "c0ffee", "s3cr3t", 600).unwrap()
}

#[tokio::test]
async fn test_live_session_for_same_user_is_valid() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    let ctx = user_ctx_cookie("ari", &["chw"]);
    let client = client(store, Some(login_cookie("ari")), Some(&ctx));

    assert_eq!(client.guardian.check_current_session().await, SessionCheck::Valid);
    assert!(client.navigator.replaced().is_empty());
    assert!(client.identity.load().is_some());
    assert_eq!(client.store.deleted_sessions(), 0);
}

#[tokio::test]
async fn test_session_of_other_user_forces_logout() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    store.add_user("bea", "c0ffee", &[]);
    // another tab logged in as bea, this tab still believes it is ari
    let ctx = user_ctx_cookie("ari", &[]);
    let client = client(store, Some(login_cookie("bea")), Some(&ctx));

    assert_eq!(
        client.guardian.check_current_session().await,
        SessionCheck::Mismatch
    );
    assert!(client.identity.load().is_none());
    assert_eq!(client.store.deleted_sessions(), 1);
    assert_eq!(
        client.navigator.replaced(),
        vec![format!(
            "/medic/login?redirect={}&username=ari",
            urlencoding::encode(CURRENT_URL)
        )]
    );
}

#[tokio::test]
async fn test_expired_session_redirects_with_username_hint() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    store.set_session_reply(SessionProbe::Unauthenticated.into());
    let ctx = user_ctx_cookie("ari", &[]);
    let client = client(store, Some(login_cookie("ari")), Some(&ctx));

    assert_eq!(
        client.guardian.check_current_session().await,
        SessionCheck::Expired
    );
    assert!(client.identity.load().is_none());
    // an expired session is not deleted
    assert_eq!(client.store.deleted_sessions(), 0);
    assert!(client.navigator.replaced()[0].ends_with("&username=ari"));
}

#[tokio::test]
async fn test_unreachable_store_changes_nothing() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    store.set_session_reply(SessionProbe::Unreachable.into());
    let ctx = user_ctx_cookie("ari", &[]);
    let client = client(store, Some(login_cookie("ari")), Some(&ctx));

    assert_eq!(
        client.guardian.check_current_session().await,
        SessionCheck::Unreachable
    );
    assert!(client.identity.load().is_some());
    assert!(client.navigator.replaced().is_empty());
    assert_eq!(client.store.deleted_sessions(), 0);
}

#[tokio::test]
async fn test_server_error_changes_nothing() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    store.set_session_reply(SessionProbe::Unexpected(500).into());
    let ctx = user_ctx_cookie("ari", &[]);
    let client = client(store, Some(login_cookie("ari")), Some(&ctx));

    assert_eq!(
        client.guardian.check_current_session().await,
        SessionCheck::Unreachable
    );
    assert!(client.navigator.replaced().is_empty());
}

#[tokio::test]
async fn test_malformed_user_ctx_cookie_logs_out() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));
    let client = client(store, Some(login_cookie("ari")), Some("not-json"));

    assert_eq!(
        client.guardian.check_current_session().await,
        SessionCheck::NoLocalIdentity
    );
    assert_eq!(client.store.deleted_sessions(), 1);
    assert_eq!(
        client.navigator.replaced(),
        vec![format!(
            "/medic/login?redirect={}",
            urlencoding::encode(CURRENT_URL)
        )]
    );
}

#[tokio::test]
async fn test_is_admin_from_cookie() {
    let store = Arc::new(MockDataStore::with_user("ari", "c0ffee", "s3cr3t"));

    let admin = client(
        Arc::clone(&store),
        None,
        Some(&user_ctx_cookie("root", &["_admin"])),
    );
    assert!(admin.guardian.is_admin());

    let manager = client(store, None, Some(&user_ctx_cookie("ari", &["national_admin"])));
    assert!(!manager.guardian.is_admin());
}
