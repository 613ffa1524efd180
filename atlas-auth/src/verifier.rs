use std::{collections::HashSet, sync::Arc};

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};

use crate::{Claims, JwksCache, VerifyError};

/// Validates Atlas access tokens against the issuer's published keys.
///
/// Checks run in a fixed order and the first failure is final: header and
/// `kid`, key lookup, signature, issuer and audience, then the validity
/// window. No leeway is applied to `nbf` or `exp`.
#[derive(Debug)]
pub struct TokenVerifier {
    cache: Arc<JwksCache>,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    pub fn new(
        cache: Arc<JwksCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn cache(&self) -> &Arc<JwksCache> {
        &self.cache
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let now = jsonwebtoken::get_current_timestamp() as i64;
        self.verify_at(token, now).await
    }

    async fn verify_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Claims, VerifyError> {
        let header =
            decode_header(token).map_err(|_| VerifyError::MalformedToken)?;
        let kid = header.kid.ok_or(VerifyError::MalformedToken)?;

        let jwk = self.cache.get_key(&kid).await?;
        let alg = jwk.algorithm()?;
        if header.alg != alg {
            return Err(VerifyError::InvalidSignature);
        }
        let key = jwk.decoding_key()?;

        // signature only; claims are checked below so each failure keeps
        // its own kind
        let mut validation = Validation::new(alg);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidRsaKey(_) => VerifyError::InvalidSignature,
                _ => VerifyError::MalformedToken,
            })?
            .claims;

        if claims.iss != self.issuer || claims.aud != self.audience {
            return Err(VerifyError::IssuerOrAudienceMismatch);
        }
        if now < claims.nbf {
            return Err(VerifyError::NotYetValid);
        }
        if now > claims.exp {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }
}
