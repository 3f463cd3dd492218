//! Claim extraction from a validated token set

use log::{debug, info};

use crate::models::{Claims, TokenExchangeResult};
use crate::oauth::client::{OidcClientError, TokenSet};
use crate::oauth::jwt_validation::JwtValidationError;

/// Turns a validated [`TokenSet`] into the canonical login identity
pub struct IdTokenProcessor;

impl IdTokenProcessor {
    /// Extract `{name, username, email}` from the ID token claims.
    ///
    /// `username` comes from `preferred_username`, which must be present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No ID token was returned
    /// - The ID token carries no `preferred_username`
    pub fn process_token_set(tokens: TokenSet) -> Result<TokenExchangeResult, OidcClientError> {
        let (Some(id_token), Some(claims)) = (tokens.id_token, tokens.claims) else {
            return Err(OidcClientError::MissingIdToken);
        };

        let username = claims
            .preferred_username
            .filter(|username| !username.is_empty())
            .ok_or_else(|| {
                OidcClientError::IdToken(JwtValidationError::InvalidToken(
                    "Missing preferred_username claim".to_string(),
                ))
            })?;

        debug!(
            "ID token claims: sub={:?}, name present={}, email present={}",
            claims.sub,
            claims.name.is_some(),
            claims.email.is_some()
        );
        info!("Processing ID token claims for user: {username}");

        Ok(TokenExchangeResult {
            id_token,
            user: Claims {
                name: claims.name,
                username,
                email: claims.email,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::jwt_validation::IdTokenClaims;

    fn token_set(preferred_username: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: Some("at".to_string()),
            id_token: Some("header.payload.sig".to_string()),
            claims: Some(IdTokenClaims {
                sub: Some("1234".to_string()),
                name: Some("Ari Example".to_string()),
                preferred_username: preferred_username.map(ToString::to_string),
                email: Some("ari@example.org".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_extracts_canonical_identity() {
        let result = IdTokenProcessor::process_token_set(token_set(Some("ari"))).unwrap();

        assert_eq!(result.id_token, "header.payload.sig");
        assert_eq!(
            result.user,
            Claims {
                name: Some("Ari Example".to_string()),
                username: "ari".to_string(),
                email: Some("ari@example.org".to_string()),
            }
        );
    }

    #[test]
    fn test_preferred_username_is_required() {
        assert!(matches!(
            IdTokenProcessor::process_token_set(token_set(None)),
            Err(OidcClientError::IdToken(_))
        ));
        assert!(matches!(
            IdTokenProcessor::process_token_set(token_set(Some(""))),
            Err(OidcClientError::IdToken(_))
        ));
    }

    #[test]
    fn test_id_token_is_required() {
        let tokens = TokenSet {
            access_token: Some("at".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            IdTokenProcessor::process_token_set(tokens),
            Err(OidcClientError::MissingIdToken)
        ));
    }
}
