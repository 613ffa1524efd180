use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use atlas_slo::{errors, Result};

use crate::{HttpKeySetSource, JwksCache, TokenVerifier};

/// How a relying party reaches and trusts the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
    /// Seconds a fetched key set is served without refetching.
    pub cache_ttl: u64,
    /// Seconds allowed for one key set fetch.
    pub fetch_timeout: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            jwks_url: "http://api:8000/.well-known/jwks.json".to_owned(),
            issuer: "buildaxis-auth".to_owned(),
            audience: "atlas-ai".to_owned(),
            cache_ttl: 300,
            fetch_timeout: 5,
        }
    }
}

impl VerifierConfig {
    /// Reads `AUTH_JWKS_URL`, `AUTH_ISSUER`, `AUTH_AUDIENCE` and
    /// `JWKS_TTL_SEC`, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup("AUTH_JWKS_URL") {
            config.jwks_url = v;
        }
        if let Some(v) = lookup("AUTH_ISSUER") {
            config.issuer = v;
        }
        if let Some(v) = lookup("AUTH_AUDIENCE") {
            config.audience = v;
        }
        if let Some(v) = lookup("JWKS_TTL_SEC") {
            config.cache_ttl = v.trim().parse().map_err(|err| {
                errors::bad_request(&format!("JWKS_TTL_SEC: {err}"))
            })?;
        }
        Ok(config)
    }

    /// Builds the per-process cache and the verifier on top of it.
    pub fn verifier(&self) -> Result<Arc<TokenVerifier>> {
        let source = HttpKeySetSource::new(
            self.jwks_url.clone(),
            Duration::from_secs(self.fetch_timeout),
        )?;
        let cache =
            JwksCache::new(Arc::new(source), Duration::from_secs(self.cache_ttl));
        Ok(Arc::new(TokenVerifier::new(
            Arc::new(cache),
            self.issuer.clone(),
            self.audience.clone(),
        )))
    }
}
