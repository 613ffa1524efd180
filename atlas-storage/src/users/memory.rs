use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use atlas_slo::Result;

use super::{User, UserStore};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    users: BTreeMap<String, User>,
    roles: BTreeSet<String>,
}

/// Process-local [`UserStore`] used for tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    state: Mutex<State>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(username).cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(username) {
            return Ok(None);
        }
        state.next_id += 1;
        let user = User {
            id: state.next_id,
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
            roles: Vec::new(),
            created_at: Utc::now().naive_utc(),
        };
        state.users.insert(username.to_owned(), user.clone());
        Ok(Some(user))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        let mut users = state.users.values().cloned().collect::<Vec<_>>();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn grant_role(
        &self,
        username: &str,
        role: &str,
    ) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        state.roles.insert(role.to_owned());
        let Some(user) = state.users.get_mut(username) else {
            return Ok(None);
        };
        if let Err(pos) = user.roles.binary_search_by(|r| r.as_str().cmp(role))
        {
            user.roles.insert(pos, role.to_owned());
        }
        Ok(Some(user.clone()))
    }
}
