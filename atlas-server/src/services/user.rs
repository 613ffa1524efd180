use tokio::sync::OnceCell;
use tracing::info;

use atlas_slo::{
    crypto::{digest::random_hex, password},
    errors, Result,
};
use atlas_storage::{Store, User};

pub const ADMIN_ROLE: &str = "admin";

/// Argon2 is deliberately slow; keep it off the async workers.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(errors::any)?
}

pub async fn verify_password(encoded: &str, password: &str) -> Result<bool> {
    let (encoded, password) = (encoded.to_owned(), password.to_owned());
    tokio::task::spawn_blocking(move || password::verify(&encoded, &password))
        .await
        .map_err(errors::any)
}

pub(super) static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// An argon2 hash of a random secret nobody knows. Logins for unknown
/// usernames are checked against it so they cost as much as a wrong
/// password.
pub async fn dummy_hash() -> Result<&'static str> {
    DUMMY_HASH
        .get_or_try_init(|| async { hash_password(&random_hex(32)).await })
        .await
        .map(String::as_str)
}

/// Makes sure `username` exists and holds the admin role. An existing
/// account keeps its password.
pub async fn bootstrap_admin(
    store: &Store,
    username: &str,
    password: &str,
) -> Result<User> {
    if store.users.find_by_username(username).await?.is_none() {
        let hash = hash_password(password).await?;
        if store.users.create(username, &hash).await?.is_some() {
            info!(username, "bootstrap admin created");
        }
    }
    store
        .users
        .grant_role(username, ADMIN_ROLE)
        .await?
        .ok_or_else(|| errors::not_found("bootstrap admin"))
}
