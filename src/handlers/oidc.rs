// OIDC login endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error};
use serde::Deserialize;
use url::Url;

use crate::bridge::SsoBridge;
use crate::error::BridgeError;
use crate::models::ClientIdentity;
use crate::session::CookieFactory;
use crate::utils::responses::ResponseBuilder;

/// Per-deployment values the login endpoints need
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    /// Externally visible base URL; falls back to the request's scheme and host
    pub public_base_url: Option<String>,
    pub cookie_secure: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
}

/// Start an OIDC login by redirecting (301) to the provider.
///
/// Initialises the provider on first use when startup discovery did not
/// complete.
///
/// # Errors
///
/// Returns an error if:
/// - OIDC is not configured (500)
/// - The provider cannot be discovered (503)
pub async fn oidc_authorize(
    req: HttpRequest,
    db: web::Path<String>,
    query: web::Query<LoginQuery>,
    bridge: web::Data<SsoBridge>,
    config: web::Data<HandlerConfig>,
) -> Result<HttpResponse, BridgeError> {
    if bridge.provider_config().await.is_none() {
        debug!("OIDC provider not initialised, discovering now");
        bridge.init().await?;
    }

    let callback = callback_url(&req, &config, &db);
    let authorization_url = bridge
        .build_authorization_redirect(&callback, query.redirect.as_deref())
        .await?;

    Ok(ResponseBuilder::redirect(authorization_url.as_str())
        .permanent()
        .build())
}

/// Finish an OIDC login: set the session cookies and redirect (302).
///
/// # Errors
///
/// Returns the bridge error for the failed step; see [`BridgeError`] for the
/// status mapping
pub async fn oidc_get_token(
    req: HttpRequest,
    bridge: web::Data<SsoBridge>,
    config: web::Data<HandlerConfig>,
) -> Result<HttpResponse, BridgeError> {
    let callback = request_url(&req, &config)?;
    let outcome = bridge.complete_login(&callback).await?;

    let cookies = CookieFactory::new(config.cookie_secure);
    let identity = ClientIdentity::from(outcome.user_ctx);
    let user_ctx_cookie = cookies
        .create_user_ctx_cookie(&identity, outcome.auth_timeout_seconds)
        .map_err(|e| {
            error!("Failed to encode userCtx cookie: {e}");
            BridgeError::Configuration(e.to_string())
        })?;

    let session_cookie =
        cookies.create_auth_session_cookie(&outcome.cookie, outcome.auth_timeout_seconds);

    Ok(ResponseBuilder::redirect(&outcome.redirect_target)
        .with_cookie(session_cookie)
        .with_cookie(user_ctx_cookie)
        .build())
}

fn public_base(req: &HttpRequest, config: &HandlerConfig) -> String {
    match &config.public_base_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => {
            let info = req.connection_info();
            format!("{}://{}", info.scheme(), info.host())
        }
    }
}

fn callback_url(req: &HttpRequest, config: &HandlerConfig, db: &str) -> String {
    format!("{}/{db}/oidc/get_token", public_base(req, config))
}

/// Absolute URL of the incoming request, as the provider redirected to it
fn request_url(req: &HttpRequest, config: &HandlerConfig) -> Result<Url, BridgeError> {
    let url = format!("{}{}", public_base(req, config), req.uri());
    Url::parse(&url)
        .map_err(|e| BridgeError::Configuration(format!("Invalid callback URL {url}: {e}")))
}
