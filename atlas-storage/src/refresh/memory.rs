use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use atlas_slo::Result;

use super::{NewRefreshToken, RefreshToken, RefreshTokenStore};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    rows: Vec<RefreshToken>,
}

impl State {
    fn insert(&mut self, token: &NewRefreshToken) {
        self.rows.retain(|r| r.user_id != token.user_id);
        self.next_id += 1;
        self.rows.push(RefreshToken {
            id: self.next_id,
            user_id: token.user_id,
            token_hash: token.token_hash.clone(),
            created_at: Utc::now().naive_utc(),
            expires_at: token.expires_at,
            revoked_at: None,
        });
    }
}

/// Process-local [`RefreshTokenStore`]. A single lock around all rows makes
/// every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    state: Mutex<State>,
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>> {
        Ok(self
            .state
            .lock()
            .await
            .rows
            .iter()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn replace_for_user(&self, token: &NewRefreshToken) -> Result<()> {
        self.state.lock().await.insert(token);
        Ok(())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        token: &NewRefreshToken,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(pos) = state
            .rows
            .iter()
            .position(|r| r.token_hash == old_hash && r.user_id == token.user_id)
        else {
            return Ok(false);
        };
        state.rows.swap_remove(pos);
        state.insert(token);
        Ok(true)
    }

    async fn delete_for_user(&self, user_id: u64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|r| r.user_id != user_id);
        Ok((before - state.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn token(user_id: u64, hash: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            token_hash: hash.to_owned(),
            expires_at: Utc::now().naive_utc() + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn replace_keeps_one_row_per_user() {
        let store = MemoryRefreshTokenStore::default();
        store.replace_for_user(&token(1, "a")).await.unwrap();
        store.replace_for_user(&token(2, "b")).await.unwrap();
        store.replace_for_user(&token(1, "c")).await.unwrap();
        assert!(store.find_by_hash("a").await.unwrap().is_none());
        assert!(store.find_by_hash("b").await.unwrap().is_some());
        let c = store.find_by_hash("c").await.unwrap().unwrap();
        assert_eq!(c.user_id, 1);
        assert!(c.is_live(Utc::now().naive_utc()));
    }

    #[tokio::test]
    async fn rotate_is_single_use() {
        let store = MemoryRefreshTokenStore::default();
        store.replace_for_user(&token(1, "a")).await.unwrap();
        assert!(store.rotate("a", &token(1, "b")).await.unwrap());
        assert!(!store.rotate("a", &token(1, "c")).await.unwrap());
        assert!(store.find_by_hash("b").await.unwrap().is_some());
        assert!(store.find_by_hash("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_for_user_counts_rows() {
        let store = MemoryRefreshTokenStore::default();
        store.replace_for_user(&token(1, "a")).await.unwrap();
        store.replace_for_user(&token(2, "b")).await.unwrap();
        assert_eq!(store.delete_for_user(1).await.unwrap(), 1);
        assert_eq!(store.delete_for_user(1).await.unwrap(), 0);
        assert!(store.find_by_hash("b").await.unwrap().is_some());
    }

    #[test]
    fn expired_or_revoked_is_not_live() {
        let now = Utc::now().naive_utc();
        let mut row = RefreshToken {
            id: 1,
            user_id: 1,
            token_hash: "x".to_owned(),
            created_at: now,
            expires_at: now - Duration::seconds(1),
            revoked_at: None,
        };
        assert!(!row.is_live(now));
        row.expires_at = now + Duration::seconds(1);
        assert!(row.is_live(now));
        row.revoked_at = Some(now);
        assert!(!row.is_live(now));
    }
}
