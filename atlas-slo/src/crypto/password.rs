use argon2::Config;
use rand::Rng;

use crate::{errors, Result};

const SALT_LEN: usize = 32;

/// Hashes a password into a self-describing argon2 encoding with a fresh salt.
pub fn hash(password: &str) -> Result<String> {
    let salt = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect::<String>();
    argon2::hash_encoded(
        password.as_bytes(),
        salt.as_bytes(),
        &Config::default(),
    )
    .map_err(errors::any)
}

/// Verifies a password against an encoding produced by [`hash`].
///
/// A malformed encoding is a mismatch, not an error: callers must not be able
/// to tell a corrupt row from a wrong password.
pub fn verify(encoded: &str, password: &str) -> bool {
    argon2::verify_encoded(encoded, password.as_bytes()).unwrap_or(false)
}
