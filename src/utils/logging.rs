// Centralized logging for recurring bridge events
use log::{error, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    pub fn log_provider_not_configured() {
        info!("⏭️  Authorization server config settings not provided.");
    }

    pub fn log_discovery_start(discovery_url: &str) {
        info!("🔧 Discovering OIDC provider at {discovery_url}");
    }

    pub fn log_provider_configured(issuer: &str, pkce: bool) {
        info!(
            "✅ OIDC provider configured ({issuer}), PKCE {}",
            if pkce { "enabled" } else { "not supported" }
        );
    }

    pub fn log_provider_unreachable(discovery_url: &str, attempts: u32, reason: &str) {
        error!("❌ OIDC discovery at {discovery_url} failed after {attempts} attempts: {reason}");
    }

    pub fn log_missing_secret(key: &str) {
        error!("❌ No OIDC client secret '{key}' configured.");
    }

    pub fn log_login_started(redirect_uri: &str, pkce: bool) {
        info!("🔍 Starting OIDC login, callback {redirect_uri}, PKCE={pkce}");
    }

    pub fn log_login_success(username: &str) {
        info!("✅ OIDC login succeeded for {username}");
    }

    pub fn log_login_failure(reason: &str) {
        warn!("❌ OIDC login failed: {reason}");
    }
}
