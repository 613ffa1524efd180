pub mod refresh;
pub mod users;

mod pool;

use std::{fmt, sync::Arc};

use sqlx::MySqlPool;

pub use pool::{connection_manager, PoolConfig};
pub use refresh::{NewRefreshToken, RefreshToken, RefreshTokenStore};
pub use users::{User, UserStore};

/// The persistent collaborators of the issuer, behind trait objects so the
/// relational backend and the in-memory one are interchangeable.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl Store {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
        }
    }

    pub fn mariadb(pool: MySqlPool) -> Self {
        Self::new(
            Arc::new(users::UserImpl::new(pool.clone())),
            Arc::new(refresh::RefreshTokenImpl::new(pool)),
        )
    }

    pub fn memory() -> Self {
        Self::new(
            Arc::new(users::MemoryUserStore::default()),
            Arc::new(refresh::MemoryRefreshTokenStore::default()),
        )
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
