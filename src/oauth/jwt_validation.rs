// ID token validation with JWKS discovery and caching
// Supports RS256 / ES256 signature verification and OIDC claims validation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Default lifetime of cached signing keys
pub const DEFAULT_JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Default tolerance applied to `exp` and `nbf`
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 60;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum JwtValidationError {
    KeyNotFound(String),
    SignatureInvalid,
    ClaimValidationFailed {
        claim: String,
        expected: String,
        actual: String,
    },
    JwksFetchFailed(String),
    UnsupportedAlgorithm(String),
    TokenExpired,
    TokenNotYetValid,
    InvalidToken(String),
    KeyDecodingFailed(String),
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyNotFound(kid) => write!(f, "Key not found: {kid}"),
            Self::SignatureInvalid => write!(f, "JWT signature verification failed"),
            Self::ClaimValidationFailed {
                claim,
                expected,
                actual,
            } => write!(
                f,
                "Claim '{claim}' validation failed: expected '{expected}', got '{actual}'"
            ),
            Self::JwksFetchFailed(msg) => write!(f, "Failed to fetch JWKS: {msg}"),
            Self::UnsupportedAlgorithm(alg) => write!(f, "Unsupported algorithm: {alg}"),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::TokenNotYetValid => write!(f, "Token is not yet valid"),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            Self::KeyDecodingFailed(msg) => write!(f, "Failed to decode key: {msg}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

// ============================================================================
// JWT Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
    pub kid: Option<String>,
}

/// Claims of an OIDC ID token that the bridge reads
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdTokenClaims {
    pub iss: Option<String>,
    pub aud: Option<serde_json::Value>, // string or array
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
    pub sub: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
}

impl IdTokenClaims {
    /// Audience values, whether the claim is a string or an array
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        match &self.aud {
            Some(serde_json::Value::String(aud)) => vec![aud.clone()],
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect(),
            _ => vec![],
        }
    }
}

// ============================================================================
// JWKS Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // RSA keys
    pub n: Option<String>,
    pub e: Option<String>,

    // EC keys
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

// ============================================================================
// JWKS Cache
// ============================================================================

/// Signing keys per JWKS URI
pub struct JwksCache {
    keys: HashMap<String, Vec<JsonWebKey>>,
    last_updated: HashMap<String, DateTime<Utc>>,
    cache_duration: Duration,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new(DEFAULT_JWKS_CACHE_DURATION)
    }
}

impl JwksCache {
    #[must_use]
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            last_updated: HashMap::new(),
            cache_duration,
        }
    }

    #[must_use]
    pub fn is_cache_valid(&self, jwks_uri: &str) -> bool {
        self.last_updated.get(jwks_uri).is_some_and(|last_updated| {
            let elapsed = Utc::now().signed_duration_since(*last_updated);
            elapsed.to_std().unwrap_or(Duration::MAX) < self.cache_duration
        })
    }

    /// Find a key by `kid`; without a `kid` only a lone key matches
    #[must_use]
    pub fn get_key(&self, jwks_uri: &str, kid: Option<&str>) -> Option<&JsonWebKey> {
        let keys = self.keys.get(jwks_uri)?;
        match kid {
            Some(kid) => keys.iter().find(|key| key.kid.as_deref() == Some(kid)),
            None if keys.len() == 1 => keys.first(),
            None => None,
        }
    }

    pub fn store_keys(&mut self, jwks_uri: &str, keys: Vec<JsonWebKey>) {
        debug!("💾 Cached {} keys from {jwks_uri}", keys.len());
        self.keys.insert(jwks_uri.to_string(), keys);
        self.last_updated.insert(jwks_uri.to_string(), Utc::now());
    }
}

// ============================================================================
// JWT Validator
// ============================================================================

/// What an ID token must match
#[derive(Debug, Clone, Copy)]
pub struct IdTokenExpectations<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
    pub jwks_uri: &'a str,
}

#[derive(Clone)]
pub struct JwtValidator {
    cache: Arc<RwLock<JwksCache>>,
    http_client: reqwest::Client,
    clock_skew_seconds: i64,
}

impl Default for JwtValidator {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl JwtValidator {
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            cache: Arc::new(RwLock::new(JwksCache::default())),
            http_client,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
        }
    }

    /// Seed the key cache, e.g. with keys fetched at discovery time
    pub async fn store_keys(&self, jwks_uri: &str, keys: Vec<JsonWebKey>) {
        self.cache.write().await.store_keys(jwks_uri, keys);
    }

    /// Fetch JWKS from URI and cache the keys
    ///
    /// # Errors
    /// Returns error if JWKS cannot be fetched or parsed
    pub async fn fetch_and_cache_jwks(&self, jwks_uri: &str) -> Result<(), JwtValidationError> {
        debug!("🔑 Fetching JWKS from {jwks_uri}");

        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| JwtValidationError::JwksFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwtValidationError::JwksFetchFailed(format!(
                "JWKS request failed with status: {}",
                response.status()
            )));
        }

        let jwks: JsonWebKeySet = response.json().await.map_err(|e| {
            JwtValidationError::JwksFetchFailed(format!("Failed to parse JWKS: {e}"))
        })?;

        self.store_keys(jwks_uri, jwks.keys).await;
        Ok(())
    }

    /// Get a public key, refreshing the cache on a miss or after expiry
    ///
    /// # Errors
    /// Returns error if key cannot be found or JWKS cannot be fetched
    pub async fn get_public_key(
        &self,
        jwks_uri: &str,
        kid: Option<&str>,
    ) -> Result<JsonWebKey, JwtValidationError> {
        {
            let cache = self.cache.read().await;
            if cache.is_cache_valid(jwks_uri) {
                if let Some(key) = cache.get_key(jwks_uri, kid) {
                    return Ok(key.clone());
                }
            }
        }

        self.fetch_and_cache_jwks(jwks_uri).await?;

        let cache = self.cache.read().await;
        cache
            .get_key(jwks_uri, kid)
            .cloned()
            .ok_or_else(|| JwtValidationError::KeyNotFound(kid.unwrap_or("<none>").to_string()))
    }

    /// Validate an ID token and return its claims
    ///
    /// # Errors
    /// Returns error if the token is malformed, the signature does not verify,
    /// or issuer / audience / expiry checks fail
    pub async fn validate_id_token(
        &self,
        token: &str,
        expected: IdTokenExpectations<'_>,
    ) -> Result<IdTokenClaims, JwtValidationError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(JwtValidationError::InvalidToken(
                "Invalid JWT format".to_string(),
            ));
        }

        let header: JwtHeader = decode_segment(parts[0], "header")?;
        debug!("📋 ID token header: alg={}, kid={:?}", header.alg, header.kid);

        if !matches!(header.alg.as_str(), "RS256" | "ES256") {
            return Err(JwtValidationError::UnsupportedAlgorithm(header.alg));
        }

        let public_key = self
            .get_public_key(expected.jwks_uri, header.kid.as_deref())
            .await?;

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let signature = URL_SAFE_NO_PAD.decode(parts[2]).map_err(|e| {
            JwtValidationError::InvalidToken(format!("Invalid signature encoding: {e}"))
        })?;
        verify_signature(
            signing_input.as_bytes(),
            &signature,
            &header.alg,
            &public_key,
        )?;

        let claims: IdTokenClaims = decode_segment(parts[1], "claims")?;
        validate_claims(
            &claims,
            &expected,
            Utc::now().timestamp(),
            self.clock_skew_seconds,
        )?;

        info!("✅ ID token validated for issuer {}", expected.issuer);
        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid {what} encoding: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid {what} JSON: {e}")))
}

fn decode_key_part(value: Option<&String>, name: &str) -> Result<Vec<u8>, JwtValidationError> {
    let value =
        value.ok_or_else(|| JwtValidationError::KeyDecodingFailed(format!("Missing {name}")))?;
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| JwtValidationError::KeyDecodingFailed(format!("Invalid {name}: {e}")))
}

fn verify_signature(
    signing_input: &[u8],
    signature: &[u8],
    algorithm: &str,
    public_key: &JsonWebKey,
) -> Result<(), JwtValidationError> {
    match algorithm {
        "RS256" => verify_rs256(signing_input, signature, public_key),
        "ES256" => verify_es256(signing_input, signature, public_key),
        alg => Err(JwtValidationError::UnsupportedAlgorithm(alg.to_string())),
    }
}

fn verify_rs256(
    signing_input: &[u8],
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtValidationError> {
    use rsa::signature::Verifier;
    use rsa::{pkcs1v15, BigUint, RsaPublicKey};
    use sha2::Sha256;

    let n = decode_key_part(public_key.n.as_ref(), "RSA modulus (n)")?;
    let e = decode_key_part(public_key.e.as_ref(), "RSA exponent (e)")?;

    let rsa_key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|e| JwtValidationError::KeyDecodingFailed(format!("Invalid RSA key: {e}")))?;

    let signature = pkcs1v15::Signature::try_from(signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)?;

    pkcs1v15::VerifyingKey::<Sha256>::new(rsa_key)
        .verify(signing_input, &signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)
}

fn verify_es256(
    signing_input: &[u8],
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtValidationError> {
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    let x = decode_key_part(public_key.x.as_ref(), "EC x coordinate")?;
    let y = decode_key_part(public_key.y.as_ref(), "EC y coordinate")?;

    // SEC1 uncompressed point: 0x04 || x || y
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);

    let verifying_key = VerifyingKey::from_sec1_bytes(&point)
        .map_err(|e| JwtValidationError::KeyDecodingFailed(format!("Invalid EC key: {e}")))?;

    // JWS carries the raw r || s form, not DER
    let signature =
        Signature::from_slice(signature).map_err(|_| JwtValidationError::SignatureInvalid)?;

    verifying_key
        .verify(signing_input, &signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)
}

fn validate_claims(
    claims: &IdTokenClaims,
    expected: &IdTokenExpectations<'_>,
    now: i64,
    clock_skew: i64,
) -> Result<(), JwtValidationError> {
    let exp = claims
        .exp
        .ok_or_else(|| JwtValidationError::InvalidToken("Missing exp claim".to_string()))?;
    if now > exp.saturating_add(clock_skew) {
        return Err(JwtValidationError::TokenExpired);
    }

    if let Some(nbf) = claims.nbf {
        if now < nbf.saturating_sub(clock_skew) {
            return Err(JwtValidationError::TokenNotYetValid);
        }
    }

    let issuer = claims.iss.as_deref().unwrap_or_default();
    if issuer != expected.issuer {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "iss".to_string(),
            expected: expected.issuer.to_string(),
            actual: issuer.to_string(),
        });
    }

    let audiences = claims.audiences();
    if !audiences.iter().any(|aud| aud == expected.audience) {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "aud".to_string(),
            expected: expected.audience.to_string(),
            actual: format!("{audiences:?}"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{TestIdTokenSigner, TEST_CLIENT_ID, TEST_ISSUER, TEST_JWKS_URI};
    use serde_json::json;

    fn expectations() -> IdTokenExpectations<'static> {
        IdTokenExpectations {
            issuer: TEST_ISSUER,
            audience: TEST_CLIENT_ID,
            jwks_uri: TEST_JWKS_URI,
        }
    }

    async fn seeded_validator(signer: &TestIdTokenSigner) -> JwtValidator {
        let validator = JwtValidator::default();
        validator
            .store_keys(TEST_JWKS_URI, vec![signer.public_jwk()])
            .await;
        validator
    }

    #[tokio::test]
    async fn test_valid_es256_token() {
        let signer = TestIdTokenSigner::new();
        let validator = seeded_validator(&signer).await;
        let token = signer.sign(&signer.standard_claims("ari"));

        let claims = validator
            .validate_id_token(&token, expectations())
            .await
            .unwrap();

        assert_eq!(claims.preferred_username.as_deref(), Some("ari"));
        assert_eq!(claims.email.as_deref(), Some("ari@test"));
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected() {
        let signer = TestIdTokenSigner::new();
        let validator = seeded_validator(&signer).await;
        let token = signer.sign(&signer.standard_claims("ari"));

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&signer.standard_claims("mallory")).unwrap(),
        );
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);

        let result = validator.validate_id_token(&forged, expectations()).await;
        assert!(matches!(result, Err(JwtValidationError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let signer = TestIdTokenSigner::new();
        let validator = seeded_validator(&signer).await;
        let mut claims = signer.standard_claims("ari");
        claims["aud"] = json!(["someone-else"]);
        let token = signer.sign(&claims);

        let result = validator.validate_id_token(&token, expectations()).await;
        assert!(matches!(
            result,
            Err(JwtValidationError::ClaimValidationFailed { ref claim, .. }) if claim == "aud"
        ));
    }

    #[tokio::test]
    async fn test_unsupported_algorithm() {
        let validator = JwtValidator::default();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let token = format!("{header}.e30.c2ln");

        let result = validator.validate_id_token(&token, expectations()).await;
        assert!(matches!(
            result,
            Err(JwtValidationError::UnsupportedAlgorithm(ref alg)) if alg == "HS256"
        ));
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let validator = JwtValidator::default();
        let result = validator
            .validate_id_token("only.two", expectations())
            .await;
        assert!(matches!(result, Err(JwtValidationError::InvalidToken(_))));
    }

    #[test]
    fn test_expiry_and_not_before_with_skew() {
        let now = 1_700_000_000;
        let mut claims = IdTokenClaims {
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_CLIENT_ID)),
            exp: Some(now - 30),
            ..Default::default()
        };

        // Expired 30 seconds ago, within the 60 second skew
        assert!(validate_claims(&claims, &expectations(), now, 60).is_ok());

        claims.exp = Some(now - 61);
        assert!(matches!(
            validate_claims(&claims, &expectations(), now, 60),
            Err(JwtValidationError::TokenExpired)
        ));

        claims.exp = Some(now + 3600);
        claims.nbf = Some(now + 120);
        assert!(matches!(
            validate_claims(&claims, &expectations(), now, 60),
            Err(JwtValidationError::TokenNotYetValid)
        ));
    }

    #[test]
    fn test_extreme_time_claims_do_not_overflow() {
        let now = 1_700_000_000;
        let mut claims = IdTokenClaims {
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_CLIENT_ID)),
            exp: Some(i64::MAX),
            nbf: Some(i64::MIN),
            ..Default::default()
        };
        assert!(validate_claims(&claims, &expectations(), now, 60).is_ok());

        claims.exp = Some(i64::MIN);
        claims.nbf = None;
        assert!(matches!(
            validate_claims(&claims, &expectations(), now, 60),
            Err(JwtValidationError::TokenExpired)
        ));

        claims.exp = Some(i64::MAX);
        claims.nbf = Some(i64::MAX);
        assert!(matches!(
            validate_claims(&claims, &expectations(), now, 60),
            Err(JwtValidationError::TokenNotYetValid)
        ));
    }

    #[test]
    fn test_issuer_mismatch() {
        let claims = IdTokenClaims {
            iss: Some("https://evil.example.com".to_string()),
            aud: Some(json!(TEST_CLIENT_ID)),
            exp: Some(i64::MAX / 2),
            ..Default::default()
        };

        assert!(matches!(
            validate_claims(&claims, &expectations(), 0, 60),
            Err(JwtValidationError::ClaimValidationFailed { ref claim, .. }) if claim == "iss"
        ));
    }

    #[test]
    fn test_audiences_from_string_or_array() {
        let single = IdTokenClaims {
            aud: Some(json!("a")),
            ..Default::default()
        };
        let many = IdTokenClaims {
            aud: Some(json!(["a", "b", 3])),
            ..Default::default()
        };

        assert_eq!(single.audiences(), vec!["a".to_string()]);
        assert_eq!(many.audiences(), vec!["a".to_string(), "b".to_string()]);
        assert!(IdTokenClaims::default().audiences().is_empty());
    }

    #[test]
    fn test_cache_lookup_without_kid() {
        let mut cache = JwksCache::default();
        let key = JsonWebKey {
            kty: "EC".to_string(),
            kid: Some("k1".to_string()),
            ..Default::default()
        };
        cache.store_keys(TEST_JWKS_URI, vec![key.clone()]);

        assert!(cache.is_cache_valid(TEST_JWKS_URI));
        assert!(cache.get_key(TEST_JWKS_URI, None).is_some());
        assert!(cache.get_key(TEST_JWKS_URI, Some("k1")).is_some());
        assert!(cache.get_key(TEST_JWKS_URI, Some("k2")).is_none());

        cache.store_keys(TEST_JWKS_URI, vec![key.clone(), key]);
        assert!(cache.get_key(TEST_JWKS_URI, None).is_none());
    }
}
