//! Native CouchDB session side of the bridge

pub mod client;
pub mod cookie;
pub mod session;

pub use client::{CouchClient, DataStoreError, SessionProbe, SessionReply};
pub use cookie::{make_cookie, make_cookie_at, AUTH_SESSION_COOKIE};
pub use session::{EstablishedSession, SessionEstablisher};
