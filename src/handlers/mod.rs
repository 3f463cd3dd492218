// HTTP request handlers for the SSO bridge
pub mod health;
pub mod oidc;

use actix_web::web;

pub use health::health;
pub use oidc::{oidc_authorize, oidc_get_token, HandlerConfig, LoginQuery};

/// Register the bridge routes
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/{db}/login/oidc", web::get().to(oidc_authorize))
        .route("/{db}/oidc/authorize", web::get().to(oidc_authorize))
        .route("/{db}/oidc/get_token", web::get().to(oidc_get_token))
        .route("/ping", web::get().to(health));
}
