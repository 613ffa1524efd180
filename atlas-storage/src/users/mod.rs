mod mariadb;
mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde::Serialize;
use utoipa::ToSchema;

pub use mariadb::UserImpl;
pub use memory::MemoryUserStore;

use atlas_slo::Result;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    /// Role names, sorted and unique.
    pub roles: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[automock]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-sensitive match.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;
    /// Creates a user without roles. `None` when the username is taken.
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>>;
    async fn list(&self) -> Result<Vec<User>>;
    /// Adds `role` to the user, creating the role on first use. Granting a
    /// role the user already holds is a no-op. `None` when the user does not
    /// exist.
    async fn grant_role(
        &self,
        username: &str,
        role: &str,
    ) -> Result<Option<User>>;
}
