#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the couch-sso-bridge application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod authentication;
pub mod bridge;
pub mod couch;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod retry;
pub mod secrets;
pub mod session;
pub mod settings;
pub mod utils;

// Mocks and fixtures for unit tests and for integration tests under `tests/`
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use bridge::{BridgeOptions, LoginOutcome, SsoBridge};
pub use error::{AuthFailure, BridgeError};
pub use handlers::{configure_services, HandlerConfig};
pub use session::SessionGuardian;
pub use settings::BridgeSettings;
