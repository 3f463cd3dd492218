// Random token generation for OAuth state and PKCE verifiers

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

/// Generate an opaque per-attempt state token
///
/// - 24 bytes (192 bits) of entropy
/// - `Base64URL` encoding without padding, 32 characters
#[must_use]
pub fn generate_state_token() -> String {
    generate_nonce(24)
}

/// Generate `length` bytes of cryptographically secure random data,
/// base64url-encoded without padding
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}
