//! Collaborator traits the SSO bridge and the Session Guardian depend on
//!
//! Production implementations live next to the concern they serve
//! (`settings`, `secrets`, `oauth::client`, `couch::client`); mocks live in
//! `testing`.

pub mod traits;

pub use traits::{
    DataStoreClient, IdentityCache, IdentityProviderClient, Navigator, SecretStore,
    SessionEndpoint, SettingsStore,
};
