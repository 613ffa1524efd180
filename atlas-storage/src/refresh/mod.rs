mod mariadb;
mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;

pub use mariadb::RefreshTokenImpl;
pub use memory::MemoryRefreshTokenStore;

use atlas_slo::Result;

/// A stored refresh token. Only the SHA-256 hex of the secret is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshToken {
    pub id: u64,
    pub user_id: u64,
    pub token_hash: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
}

impl RefreshToken {
    /// Unexpired and not revoked at `now`.
    pub fn is_live(&self, now: NaiveDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at >= now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRefreshToken {
    pub user_id: u64,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
}

/// Every write keeps at most one token per user: rows are only ever
/// inserted after all of the user's previous rows are gone, in the same
/// transaction.
#[automock]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshToken>>;
    /// Deletes every token of `token.user_id`, then inserts `token`.
    async fn replace_for_user(&self, token: &NewRefreshToken) -> Result<()>;
    /// Consumes the row `old_hash` and installs `token` for the same user.
    ///
    /// Returns `false` without writing anything when `old_hash` is no longer
    /// present, which is what a second presentation of an already rotated
    /// secret observes.
    async fn rotate(
        &self,
        old_hash: &str,
        token: &NewRefreshToken,
    ) -> Result<bool>;
    /// Returns the number of rows removed.
    async fn delete_for_user(&self, user_id: u64) -> Result<u64>;
}
