//! reqwest-backed OIDC relying-party client

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::authentication::IdentityProviderClient;
use crate::oauth::jwt_validation::{
    IdTokenClaims, IdTokenExpectations, JwtValidationError, JwtValidator,
};
use crate::oauth::pkce::CODE_CHALLENGE_METHOD;
use crate::oauth::provider::{OidcDiscoveryDocument, ProviderConfig};

#[derive(Debug, Error)]
pub enum OidcClientError {
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Invalid provider metadata: {0}")]
    InvalidMetadata(String),

    /// The provider redirected back with an `error` parameter
    #[error("Provider returned error: {0}")]
    Provider(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token endpoint rejected the grant: {0}")]
    GrantRejected(String),

    #[error("ID token expected but not returned")]
    MissingIdToken,

    #[error("ID token invalid: {0}")]
    IdToken(#[from] JwtValidationError),
}

/// Query parameters of an authorization request beyond `client_id` and
/// `response_type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    /// S256 challenge; only sent to providers that support PKCE
    pub code_challenge: Option<String>,
}

impl AuthorizationParams {
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope.as_str()),
            ("state", self.state.as_str()),
        ];
        if let Some(challenge) = &self.code_challenge {
            pairs.push(("code_challenge_method", CODE_CHALLENGE_METHOD));
            pairs.push(("code_challenge", challenge.as_str()));
        }
        pairs
    }
}

/// Checks and inputs for redeeming an authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeParams {
    pub redirect_uri: String,
    /// The `state` this callback must echo
    pub state: String,
    pub code_verifier: Option<String>,
    pub id_token_expected: bool,
}

/// Tokens returned by the token endpoint; `claims` are set once the ID token
/// has been validated
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub claims: Option<IdTokenClaims>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Clone, Default)]
pub struct HttpIdentityProviderClient {
    http_client: reqwest::Client,
    validator: JwtValidator,
}

impl HttpIdentityProviderClient {
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            validator: JwtValidator::new(http_client.clone()),
            http_client,
        }
    }

    fn callback_params(callback_url: &Url) -> HashMap<String, String> {
        callback_url.query_pairs().into_owned().collect()
    }

    fn check_callback(
        callback_url: &Url,
        params: &ExchangeParams,
    ) -> Result<String, OidcClientError> {
        let query = Self::callback_params(callback_url);

        if let Some(error) = query.get("error") {
            let description = query
                .get("error_description")
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            return Err(OidcClientError::Provider(format!("{error}{description}")));
        }

        match query.get("state") {
            Some(state) if *state == params.state => {}
            Some(_) => {
                return Err(OidcClientError::InvalidCallback(
                    "state mismatch".to_string(),
                ))
            }
            None => {
                return Err(OidcClientError::InvalidCallback(
                    "missing state".to_string(),
                ))
            }
        }

        query
            .get("code")
            .filter(|code| !code.is_empty())
            .cloned()
            .ok_or_else(|| OidcClientError::InvalidCallback("missing code".to_string()))
    }

    async fn request_tokens(
        &self,
        config: &ProviderConfig,
        code: &str,
        params: &ExchangeParams,
    ) -> Result<TokenResponse, OidcClientError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", params.redirect_uri.as_str()),
        ];
        if let Some(verifier) = &params.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        let response = self
            .http_client
            .post(&config.metadata.token_endpoint)
            .basic_auth(
                urlencoding::encode(&config.client_id),
                Some(urlencoding::encode(config.client_secret())),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| OidcClientError::TokenRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenErrorResponse>(&body).map_or_else(
                |_| format!("status {status}"),
                |e| match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                },
            );
            warn!("❌ Token endpoint rejected authorization code: {reason}");
            return Err(OidcClientError::GrantRejected(reason));
        }

        response
            .json()
            .await
            .map_err(|e| OidcClientError::TokenRequest(format!("Invalid token response: {e}")))
    }
}

#[async_trait]
impl IdentityProviderClient for HttpIdentityProviderClient {
    async fn discover(
        &self,
        discovery_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<ProviderConfig, OidcClientError> {
        debug!("Fetching discovery document from: {discovery_url}");

        let response = self
            .http_client
            .get(discovery_url)
            .send()
            .await
            .map_err(|e| OidcClientError::Discovery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OidcClientError::Discovery(format!(
                "Discovery document request failed with status: {}",
                response.status()
            )));
        }

        let metadata: OidcDiscoveryDocument = response
            .json()
            .await
            .map_err(|e| OidcClientError::InvalidMetadata(e.to_string()))?;

        if metadata.issuer.is_empty() {
            return Err(OidcClientError::InvalidMetadata(
                "issuer is empty".to_string(),
            ));
        }

        debug!("Successfully fetched discovery document for {}", metadata.issuer);
        Ok(ProviderConfig::new(metadata, client_id, client_secret))
    }

    fn build_authorization_url(
        &self,
        config: &ProviderConfig,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcClientError> {
        let mut url = Url::parse(&config.metadata.authorization_endpoint).map_err(|e| {
            OidcClientError::InvalidMetadata(format!("authorization_endpoint: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .extend_pairs(params.query_pairs());

        Ok(url)
    }

    async fn exchange_code(
        &self,
        config: &ProviderConfig,
        callback_url: &Url,
        params: &ExchangeParams,
    ) -> Result<TokenSet, OidcClientError> {
        let code = Self::check_callback(callback_url, params)?;
        let tokens = self.request_tokens(config, &code, params).await?;

        let claims = match &tokens.id_token {
            Some(id_token) => Some(
                self.validator
                    .validate_id_token(
                        id_token,
                        IdTokenExpectations {
                            issuer: config.issuer(),
                            audience: &config.client_id,
                            jwks_uri: &config.metadata.jwks_uri,
                        },
                    )
                    .await?,
            ),
            None if params.id_token_expected => return Err(OidcClientError::MissingIdToken),
            None => None,
        };

        Ok(TokenSet {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            claims,
        })
    }
}
