use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `value`.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// `len` bytes from the thread-local CSPRNG, base64url without padding.
pub fn random_urlsafe(len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(len))
}

/// `len` bytes from the thread-local CSPRNG, lowercase hex.
pub fn random_hex(len: usize) -> String {
    hex::encode(random_bytes(len))
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
