pub mod auth;
pub mod jwks;
pub mod users;

use serde::Serialize;
use utoipa::ToSchema;

use atlas_storage::User;

/// What the API reveals about an account.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub username: String,
    pub roles: Vec<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            roles: user.roles,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserChanged {
    pub ok: bool,
    pub username: String,
    pub roles: Vec<String>,
}

impl From<User> for UserChanged {
    fn from(user: User) -> Self {
        Self {
            ok: true,
            username: user.username,
            roles: user.roles,
        }
    }
}
