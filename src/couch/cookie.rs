//! Native `AuthSession` cookie synthesis
//!
//! Produces the same value CouchDB's cookie authentication handler issues:
//! `base64url(user ":" HEX(expiry) ":" HMAC-SHA1(secret ++ salt, user ":" HEX(expiry)))`
//! with no padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Cookie name the data store reads its native session from
pub const AUTH_SESSION_COOKIE: &str = "AuthSession";

type HmacSha1 = Hmac<Sha1>;

/// Synthesize a session cookie valid for `timeout_seconds` from now
///
/// # Errors
///
/// Returns an error if the HMAC key is rejected
pub fn make_cookie(
    username: &str,
    salt: &str,
    secret: &str,
    timeout_seconds: u64,
) -> Result<String, InvalidLength> {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    make_cookie_at(username, salt, secret, timeout_seconds, now)
}

/// Synthesize a session cookie as if issued at `issued_at` (Unix seconds)
///
/// # Errors
///
/// Returns an error if the HMAC key is rejected
pub fn make_cookie_at(
    username: &str,
    salt: &str,
    secret: &str,
    timeout_seconds: u64,
    issued_at: u64,
) -> Result<String, InvalidLength> {
    let expiry = issued_at.saturating_add(timeout_seconds);
    let message = format!("{username}:{expiry:X}");

    let mut key = Vec::with_capacity(secret.len() + salt.len());
    key.extend_from_slice(secret.as_bytes());
    key.extend_from_slice(salt.as_bytes());

    let mut mac = HmacSha1::new_from_slice(&key)?;
    mac.update(message.as_bytes());
    let signature = mac.finalize().into_bytes();

    let mut payload = Vec::with_capacity(message.len() + 1 + signature.len());
    payload.extend_from_slice(message.as_bytes());
    payload.push(b':');
    payload.extend_from_slice(&signature);

    Ok(URL_SAFE_NO_PAD.encode(payload))
}
