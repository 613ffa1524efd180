use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use atlas_auth::Claims;
use atlas_slo::{
    crypto::digest::{random_hex, random_urlsafe, sha256_hex},
    errors::{self, WithBacktrace},
};
use atlas_storage::{NewRefreshToken, Store, User};

use super::{
    key::SigningKey,
    user::{dummy_hash, hash_password, verify_password},
};

const REFRESH_SECRET_BYTES: usize = 32;
const JTI_BYTES: usize = 12;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] WithBacktrace),
}

impl From<AuthError> for WithBacktrace {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => errors::unauthorized(),
            AuthError::UsernameTaken | AuthError::InvalidRefreshToken => {
                errors::bad_request(&err)
            }
            AuthError::NotFound => errors::not_found(&err),
            AuthError::Store(err) => err,
        }
    }
}

type Result<T, E = AuthError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Issues access tokens and rotates refresh tokens.
///
/// A user has at most one live refresh token: every issuance replaces all
/// of the user's previous tokens, and a refresh consumes the presented
/// token in the same transaction that installs its successor.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    store: Store,
    key: Arc<SigningKey>,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        store: Store,
        key: Arc<SigningKey>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            key,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Unknown user and wrong password are the same failure, and both pay
    /// for one argon2 verification.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User> {
        let user = self.store.users.find_by_username(username).await?;
        let encoded = match &user {
            Some(user) => user.password_hash.as_str(),
            None => dummy_hash().await?,
        };
        let matches = verify_password(encoded, password).await?;
        match user {
            Some(user) if matches => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    #[tracing::instrument(skip_all, fields(user = %user.username))]
    pub async fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        let (secret, token) = self.new_refresh_token(user);
        self.store.refresh_tokens.replace_for_user(&token).await?;
        self.pair(user, secret)
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, secret: &str) -> Result<TokenPair> {
        let presented = sha256_hex(secret);
        let Some(row) =
            self.store.refresh_tokens.find_by_hash(&presented).await?
        else {
            return Err(AuthError::InvalidRefreshToken);
        };
        if !row.is_live(Utc::now().naive_utc()) {
            return Err(AuthError::InvalidRefreshToken);
        }
        let Some(user) = self.store.users.find_by_id(row.user_id).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };

        let (secret, token) = self.new_refresh_token(&user);
        if !self
            .store
            .refresh_tokens
            .rotate(&presented, &token)
            .await?
        {
            warn!(user = %user.username, "refresh token presented twice");
            return Err(AuthError::InvalidRefreshToken);
        }
        self.pair(&user, secret)
    }

    /// Access tokens already handed out stay valid until they expire.
    pub async fn logout(&self, user: &User) -> Result<()> {
        let removed = self.store.refresh_tokens.delete_for_user(user.id).await?;
        info!(user = %user.username, removed, "logged out");
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User> {
        if self.store.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }
        let hash = hash_password(password).await?;
        let user = self
            .store
            .users
            .create(username, &hash)
            .await?
            .ok_or(AuthError::UsernameTaken)?;
        info!(username, "user registered");
        Ok(user)
    }

    pub async fn grant_role(&self, username: &str, role: &str) -> Result<User> {
        let user = self
            .store
            .users
            .grant_role(username, role)
            .await?
            .ok_or(AuthError::NotFound)?;
        info!(username, role, "role granted");
        Ok(user)
    }

    pub fn access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user.username.clone(),
            iat: now,
            nbf: now,
            exp: now + self.access_ttl.num_seconds(),
            jti: random_hex(JTI_BYTES),
            roles: user.roles.clone(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.kid().to_owned());
        encode(&header, &claims, self.key.encoding_key())
            .map_err(|err| AuthError::Store(errors::any(err)))
    }

    fn new_refresh_token(&self, user: &User) -> (String, NewRefreshToken) {
        let secret = random_urlsafe(REFRESH_SECRET_BYTES);
        let token = NewRefreshToken {
            user_id: user.id,
            token_hash: sha256_hex(&secret),
            expires_at: (Utc::now() + self.refresh_ttl).naive_utc(),
        };
        (secret, token)
    }

    fn pair(&self, user: &User, refresh_token: String) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.access_token(user)?,
            refresh_token,
            token_type: "bearer".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use atlas_auth::{JwksCache, TokenVerifier, VerifyError};
    use atlas_storage::{
        refresh::MockRefreshTokenStore, users::MemoryUserStore, RefreshToken,
    };

    use super::*;
    use crate::services::{jwks::JwksPublisher, key::tests::shared_key};

    fn issuer(store: Store) -> TokenIssuer {
        TokenIssuer::new(
            store,
            shared_key(),
            "buildaxis-auth",
            "atlas-ai",
            Duration::minutes(15),
            Duration::days(30),
        )
    }

    fn verifier() -> TokenVerifier {
        let cache = JwksCache::new(
            Arc::new(JwksPublisher::new(shared_key())),
            StdDuration::from_secs(300),
        );
        TokenVerifier::new(Arc::new(cache), "buildaxis-auth", "atlas-ai")
    }

    async fn alice(issuer: &TokenIssuer) -> User {
        issuer.register("alice", "wonderland").await.unwrap();
        issuer.grant_role("alice", "admin").await.unwrap()
    }

    #[tokio::test]
    async fn login_yields_verifiable_token() {
        let store = Store::memory();
        let issuer = issuer(store.clone());
        alice(&issuer).await;

        let user = issuer.authenticate("alice", "wonderland").await.unwrap();
        let pair = issuer.issue_pair(&user).await.unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.refresh_token.len(), 43);

        let claims = verifier().verify(&pair.access_token).await.unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.roles, vec!["admin"]);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.jti.len(), 24);

        // only the hash is stored
        let row = store
            .refresh_tokens
            .find_by_hash(&sha256_hex(&pair.refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id, user.id);
        assert!(store
            .refresh_tokens
            .find_by_hash(&pair.refresh_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let issuer = issuer(Store::memory());
        alice(&issuer).await;

        let wrong_password = issuer.authenticate("alice", "nope").await.unwrap_err();
        let unknown_user = issuer.authenticate("mallory", "nope").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        // usernames are case-sensitive
        assert!(issuer.authenticate("Alice", "wonderland").await.is_err());
    }

    #[tokio::test]
    async fn unknown_user_still_runs_a_password_check() {
        let issuer = issuer(Store::memory());

        let err = issuer.authenticate("ghost", "boo").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(crate::services::user::DUMMY_HASH.initialized());
    }

    #[tokio::test]
    async fn refresh_rotation_scenario() {
        let issuer = issuer(Store::memory());
        let user = alice(&issuer).await;

        let p1 = issuer.issue_pair(&user).await.unwrap();
        let p2 = issuer.refresh(&p1.refresh_token).await.unwrap();
        assert_ne!(p1.refresh_token, p2.refresh_token);
        assert!(matches!(
            issuer.refresh(&p1.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));

        issuer.logout(&user).await.unwrap();
        assert!(matches!(
            issuer.refresh(&p2.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn second_login_invalidates_first() {
        let store = Store::memory();
        let issuer = issuer(store.clone());
        let user = alice(&issuer).await;

        let first = issuer.issue_pair(&user).await.unwrap();
        let second = issuer.issue_pair(&user).await.unwrap();
        assert!(matches!(
            issuer.refresh(&first.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(issuer.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let issuer = Arc::new(issuer(Store::memory()));
        let user = alice(&issuer).await;
        let pair = issuer.issue_pair(&user).await.unwrap();

        let attempts = (0..4)
            .map(|_| {
                let issuer = Arc::clone(&issuer);
                let secret = pair.refresh_token.clone();
                tokio::spawn(async move { issuer.refresh(&secret).await })
            })
            .collect::<Vec<_>>();
        let mut winners = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert!(matches!(err, AuthError::InvalidRefreshToken)),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn refreshed_token_carries_current_roles() {
        let issuer = issuer(Store::memory());
        let user = alice(&issuer).await;
        let pair = issuer.issue_pair(&user).await.unwrap();
        issuer.grant_role("alice", "editor").await.unwrap();

        let pair = issuer.refresh(&pair.refresh_token).await.unwrap();
        let claims = verifier().verify(&pair.access_token).await.unwrap();
        assert_eq!(claims.roles, vec!["admin", "editor"]);
    }

    #[tokio::test]
    async fn expired_or_revoked_refresh_token_is_rejected() {
        let secret = "expired-secret";
        let now = Utc::now().naive_utc();
        for (expires_at, revoked_at) in [
            (now - Duration::seconds(1), None),
            (now + Duration::days(1), Some(now)),
        ] {
            let mut refresh = MockRefreshTokenStore::new();
            refresh
                .expect_find_by_hash()
                .times(1)
                .returning(move |hash| {
                    Ok(Some(RefreshToken {
                        id: 1,
                        user_id: 1,
                        token_hash: hash.to_owned(),
                        created_at: now,
                        expires_at,
                        revoked_at,
                    }))
                });
            refresh.expect_rotate().never();
            let store = Store::new(
                Arc::new(MemoryUserStore::default()),
                Arc::new(refresh),
            );

            assert!(matches!(
                issuer(store).refresh(secret).await,
                Err(AuthError::InvalidRefreshToken)
            ));
        }
    }

    #[tokio::test]
    async fn register_and_grant_edge_cases() {
        let issuer = issuer(Store::memory());
        let bob = issuer.register("bob", "pw").await.unwrap();
        assert!(bob.roles.is_empty());
        assert!(matches!(
            issuer.register("bob", "other").await,
            Err(AuthError::UsernameTaken)
        ));
        assert!(matches!(
            issuer.grant_role("nobody", "admin").await,
            Err(AuthError::NotFound)
        ));
        issuer.grant_role("bob", "viewer").await.unwrap();
        let bob = issuer.grant_role("bob", "viewer").await.unwrap();
        assert_eq!(bob.roles, vec!["viewer"]);
    }

    #[tokio::test]
    async fn expired_access_token_fails_verification() {
        let issuer = TokenIssuer::new(
            Store::memory(),
            shared_key(),
            "buildaxis-auth",
            "atlas-ai",
            Duration::seconds(-5),
            Duration::days(30),
        );
        let user = alice(&issuer).await;
        let token = issuer.access_token(&user).unwrap();
        assert_eq!(
            verifier().verify(&token).await.unwrap_err(),
            VerifyError::Expired
        );
    }

    #[test]
    fn errors_map_to_status() {
        use http::StatusCode;

        let status = |err: AuthError| WithBacktrace::from(err).status();
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::UsernameTaken), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::InvalidRefreshToken), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AuthError::Store(errors::anyhow(anyhow::anyhow!("db down")))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
