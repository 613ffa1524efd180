use std::{ops::Deref, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::info;

use atlas_auth::{JwksCache, TokenVerifier};
use atlas_slo::errors;
use atlas_storage::Store;

use crate::{
    services::{
        jwks::JwksPublisher,
        key::{KeyStore, SigningKey},
        token::TokenIssuer,
        user,
    },
    AppConfig,
};

#[derive(Debug)]
pub struct App {
    pub config: AppConfig,
    pub store: Store,
    pub issuer: TokenIssuer,
    pub publisher: JwksPublisher,
    /// Verifies the issuer's own tokens for its bearer-protected endpoints.
    pub verifier: Arc<TokenVerifier>,
}

impl App {
    pub fn new(store: Store, config: AppConfig) -> Result<Self> {
        info!("initializing signing key...");
        let key_store = KeyStore::new(&config.key_dir);
        let key = if config.rotate_signing_key {
            key_store.rotate()
        } else {
            key_store.ensure_key()
        }
        .context("could not initialize the signing key")?;

        let app = Self::with_key(store, config, Arc::new(key));
        info!("feature services successfully initialized!");
        Ok(app)
    }

    pub fn with_key(store: Store, config: AppConfig, key: Arc<SigningKey>) -> Self {
        let publisher = JwksPublisher::new(Arc::clone(&key));
        let cache = JwksCache::new(
            Arc::new(publisher.clone()),
            Duration::from_secs(config.jwks_max_age),
        );
        let verifier = Arc::new(TokenVerifier::new(
            Arc::new(cache),
            config.issuer.clone(),
            config.audience.clone(),
        ));
        let issuer = TokenIssuer::new(
            store.clone(),
            key,
            config.issuer.clone(),
            config.audience.clone(),
            chrono::Duration::minutes(config.access_token_minutes),
            chrono::Duration::days(config.refresh_token_days),
        );
        Self {
            config,
            store,
            issuer,
            publisher,
            verifier,
        }
    }

    /// Startup step that guarantees the bootstrap administrator.
    pub async fn bootstrap(&self) -> Result<()> {
        let admin = user::bootstrap_admin(
            &self.store,
            &self.config.admin_user,
            &self.config.admin_pass,
        )
        .await
        .context("could not bootstrap the admin user")?;
        info!(username = %admin.username, "admin user ready");
        user::dummy_hash()
            .await
            .context("could not prepare the login hash")?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AppState(pub Arc<App>);

impl Deref for AppState {
    type Target = App;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppState
where
    Self: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = errors::WithBacktrace;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}
