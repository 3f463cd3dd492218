//! Error taxonomy for the SSO bridge
//!
//! Every public bridge operation fails with a [`BridgeError`]. Lower layers
//! (identity-provider client, JWT validation, data-store client) keep their own
//! error enums and are folded into this taxonomy at the bridge boundary.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Generic message returned to end users when the identity provider is down
pub const SSO_UNAVAILABLE_MESSAGE: &str = "The SSO provider is unreachable.";

/// Message used when OIDC login is requested but not configured
pub const NOT_CONFIGURED_MESSAGE: &str = "Authorization server config settings not provided.";

/// Refinement of authentication failures, used to pick the HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// The callback request itself is malformed (missing code, unknown state)
    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    /// The provider refused the authorization code or the ID token is invalid
    #[error("invalid authorization code: {0}")]
    InvalidGrant(String),

    /// No usable user record exists in the data store
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The data store did not honor the synthesized session cookie
    #[error("could not log in (session check returned {status})")]
    SessionRejected { status: u16 },
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid configuration; fatal and surfaced to operators
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The identity provider could not be reached after bounded retries
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthFailure),

    /// No response was received from the data store
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
}

impl BridgeError {
    /// Message that is safe to show to an end user
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Configuration(msg) if msg == NOT_CONFIGURED_MESSAGE => msg.clone(),
            Self::Configuration(_) => "An error occurred when logging in.".to_string(),
            Self::ServiceUnavailable(_) | Self::TransientNetwork(_) => {
                SSO_UNAVAILABLE_MESSAGE.to_string()
            }
            Self::Authentication(AuthFailure::InvalidGrant(_)) => {
                "Invalid authorization code.".to_string()
            }
            Self::Authentication(AuthFailure::InvalidCallback(_)) => {
                "Invalid login callback.".to_string()
            }
            Self::Authentication(_) => "Invalid. Could not login using SSO.".to_string(),
        }
    }
}

impl ResponseError for BridgeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) | Self::TransientNetwork(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Authentication(AuthFailure::InvalidCallback(_) | AuthFailure::InvalidGrant(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            BridgeError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BridgeError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            BridgeError::from(AuthFailure::InvalidGrant("bad code".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BridgeError::from(AuthFailure::UnknownUser("ari".into())).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            BridgeError::from(AuthFailure::SessionRejected { status: 401 }).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = BridgeError::Configuration("CouchDB secret has not been set".into());
        assert!(!err.public_message().contains("secret"));

        let err = BridgeError::ServiceUnavailable("connection refused".into());
        assert_eq!(err.public_message(), SSO_UNAVAILABLE_MESSAGE);

        let err = BridgeError::Configuration(NOT_CONFIGURED_MESSAGE.into());
        assert_eq!(err.public_message(), NOT_CONFIGURED_MESSAGE);
    }
}
