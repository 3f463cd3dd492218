//! Test doubles and fixtures for the bridge
//!
//! Compiled for unit tests and, with the `testing` feature, for the
//! integration tests under `tests/`.
//!
//! - [`fixtures`] - provider metadata and a deterministic ID-token signer
//! - [`mock`] - in-memory implementations of every collaborator trait

pub mod fixtures;
pub mod mock;

pub use fixtures::{
    discovery_document, TestIdTokenSigner, TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_ISSUER,
};
pub use mock::{
    MockDataStore, MockExchange, MockIdentityProvider, MockSecretStore, MockSessionEndpoint,
    MockSettingsStore, RecordingNavigator,
};
