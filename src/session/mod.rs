//! Client-facing session handling
//!
//! - [`cookie`] - cookies handed to the browser after a login
//! - [`guardian`] - reconciles the cached client identity with the server session

pub mod cookie;
pub mod guardian;

pub use cookie::{CookieFactory, CookieOptions, USER_CTX_COOKIE};
pub use guardian::{
    CouchSessionEndpoint, InMemoryIdentityCache, SessionCheck, SessionGuardian,
};
