//! Proof Key for Code Exchange (RFC 7636) values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a generated code verifier.
pub const VERIFIER_LEN: usize = 128;

/// Unreserved characters allowed in a verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of a generated anti-forgery state.
const STATE_LEN: usize = 32;

/// A fresh 128-character code verifier.
pub fn generate_verifier() -> String {
    random_string(VERIFIER_LEN, VERIFIER_CHARSET)
}

/// `base64url(SHA-256(verifier))` without padding, the `S256` challenge.
pub fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// A fresh anti-forgery `state` value.
pub fn generate_state() -> String {
    random_string(
        STATE_LEN,
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
    )
}

fn random_string(len: usize, charset: &[u8]) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}
