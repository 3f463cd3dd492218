//! OIDC relying-party side of the bridge
//!
//! Provider discovery and caching, PKCE, per-attempt state, the token
//! exchange and ID-token validation.

pub mod client;
pub mod jwt_validation;
pub mod pending;
pub mod pkce;
pub mod provider;
pub mod token_processor;

pub use client::{
    AuthorizationParams, ExchangeParams, HttpIdentityProviderClient, OidcClientError, TokenSet,
};
pub use jwt_validation::{IdTokenClaims, JwtValidationError, JwtValidator};
pub use pending::{PendingAuthorization, PendingAuthorizations};
pub use provider::{OidcDiscoveryDocument, ProviderConfig, ProviderConfigCache};
pub use token_processor::IdTokenProcessor;
