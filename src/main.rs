#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use couch_sso_bridge::{
    bridge::{BridgeOptions, SsoBridge},
    couch::CouchClient,
    handlers::{configure_services, HandlerConfig},
    oauth::HttpIdentityProviderClient,
    secrets::SecretsDirStore,
    settings::{BridgeSettings, FileSettingsStore},
};
use log::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = BridgeSettings::load().context("Failed to load settings")?;

    let couch = CouchClient::from_url(&settings.couchdb.url, &settings.couchdb.node_name)
        .context("Invalid COUCH_URL")?;
    let db_name = couch.db_name().to_string();

    let bridge = SsoBridge::new(
        Arc::new(FileSettingsStore::new(".")),
        Arc::new(SecretsDirStore::new(settings.secrets.secrets_dir.clone())),
        Arc::new(HttpIdentityProviderClient::new(reqwest::Client::new())),
        Arc::new(couch),
        BridgeOptions::from_settings(&settings),
    );

    // A provider that is down at startup is retried lazily on the first login
    if let Err(e) = bridge.init().await {
        error!("OIDC initialisation failed, continuing without SSO: {e}");
    }

    start_server(bridge, &settings, &db_name).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    bridge: SsoBridge,
    settings: &BridgeSettings,
    db_name: &str,
) -> anyhow::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings, db_name);

    let bridge = web::Data::new(bridge);
    let handler_config = web::Data::new(HandlerConfig {
        public_base_url: settings.application.public_base_url.clone(),
        cookie_secure: settings.cookies.secure,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(bridge.clone())
            .app_data(handler_config.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await?;

    Ok(())
}

fn print_startup_info(bind_address: &str, settings: &BridgeSettings, db_name: &str) {
    info!("Starting CouchDB SSO bridge on http://{bind_address}");
    info!("OIDC endpoints:");
    info!("  GET  /{db_name}/login/oidc      - Start login");
    info!("  GET  /{db_name}/oidc/authorize  - Start login");
    info!("  GET  /{db_name}/oidc/get_token  - OIDC callback");
    info!("  GET  /ping                      - Health check");
    if let Some(base) = &settings.application.public_base_url {
        info!("Callback URL for the identity provider: {base}/{db_name}/oidc/get_token");
    }
}
