//! Pre-built provider metadata and signed ID tokens

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use serde_json::{json, Value};

use crate::oauth::jwt_validation::JsonWebKey;
use crate::oauth::provider::OidcDiscoveryDocument;

pub const TEST_ISSUER: &str = "https://idp.example.test";
pub const TEST_JWKS_URI: &str = "https://idp.example.test/jwks";
pub const TEST_CLIENT_ID: &str = "cht-client";
pub const TEST_CLIENT_SECRET: &str = "cht-client-secret";
pub const TEST_KEY_ID: &str = "test-key-1";

/// Discovery document for `issuer` with PKCE (S256) advertised
#[must_use]
pub fn discovery_document(issuer: &str) -> OidcDiscoveryDocument {
    OidcDiscoveryDocument {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{issuer}/authorize"),
        token_endpoint: format!("{issuer}/token"),
        jwks_uri: format!("{issuer}/jwks"),
        userinfo_endpoint: Some(format!("{issuer}/userinfo")),
        end_session_endpoint: None,
        code_challenge_methods_supported: vec!["plain".to_string(), "S256".to_string()],
        id_token_signing_alg_values_supported: vec!["ES256".to_string()],
    }
}

/// Signs ES256 ID tokens with a fixed P-256 key
pub struct TestIdTokenSigner {
    key: SigningKey,
}

impl Default for TestIdTokenSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestIdTokenSigner {
    /// # Panics
    ///
    /// Panics if the fixed scalar is not a valid P-256 secret key
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: SigningKey::from_slice(&[0x2a; 32]).expect("valid P-256 scalar"),
        }
    }

    /// Public half as a JWK
    ///
    /// # Panics
    ///
    /// Panics if the verifying key is the identity point
    #[must_use]
    pub fn public_jwk(&self) -> JsonWebKey {
        let point = self.key.verifying_key().to_encoded_point(false);
        JsonWebKey {
            kty: "EC".to_string(),
            kid: Some(TEST_KEY_ID.to_string()),
            alg: Some("ES256".to_string()),
            key_use: Some("sig".to_string()),
            crv: Some("P-256".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(point.x().expect("affine x"))),
            y: Some(URL_SAFE_NO_PAD.encode(point.y().expect("affine y"))),
            ..Default::default()
        }
    }

    /// JWKS document containing the public key
    #[must_use]
    pub fn jwks_json(&self) -> Value {
        json!({ "keys": [self.public_jwk()] })
    }

    /// Valid claims for `username` issued by [`TEST_ISSUER`]
    #[must_use]
    pub fn standard_claims(&self, username: &str) -> Value {
        Self::claims_for(TEST_ISSUER, username)
    }

    #[must_use]
    pub fn claims_for(issuer: &str, username: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": issuer,
            "aud": TEST_CLIENT_ID,
            "sub": format!("sub-{username}"),
            "iat": now,
            "exp": now + 300,
            "name": "Test User",
            "preferred_username": username,
            "email": format!("{username}@test"),
        })
    }

    /// Compact JWS over `claims`
    ///
    /// # Panics
    ///
    /// Panics if the claims cannot be serialized
    #[must_use]
    pub fn sign(&self, claims: &Value) -> String {
        let header = json!({ "alg": "ES256", "typ": "JWT", "kid": TEST_KEY_ID });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header")),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims"))
        );
        let signature: Signature = self.key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}
