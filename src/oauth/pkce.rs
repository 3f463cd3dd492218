//! PKCE (Proof Key for Code Exchange, RFC 7636) verifier and S256 challenge

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::utils::crypto::generate_nonce;

/// The only challenge method the bridge sends
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Fresh random verifier: 32 random bytes, base64url, 43 characters
#[must_use]
pub fn random_code_verifier() -> String {
    generate_nonce(32)
}

/// `BASE64URL(SHA256(ASCII(verifier)))`
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
