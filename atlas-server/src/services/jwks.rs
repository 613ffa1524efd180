use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::traits::PublicKeyParts;

use atlas_auth::{Jwk, JwkSet, KeySetSource};
use atlas_slo::Result;

use super::key::SigningKey;

/// Public projection of the signing key.
#[derive(Debug, Clone)]
pub struct JwksPublisher {
    key: Arc<SigningKey>,
}

impl JwksPublisher {
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self { key }
    }

    pub fn publish(&self) -> JwkSet {
        let public = self.key.public_key();
        JwkSet {
            keys: vec![Jwk::rsa_signing(
                self.key.kid(),
                URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            )],
        }
    }
}

/// Lets the issuer verify its own tokens through the same cache a relying
/// party uses, without a network round trip.
#[async_trait]
impl KeySetSource for JwksPublisher {
    async fn fetch(&self) -> Result<JwkSet> {
        Ok(self.publish())
    }
}

#[cfg(test)]
mod tests {
    use rsa::{BigUint, RsaPublicKey};

    use super::*;
    use crate::services::key::tests::shared_key;

    #[test]
    fn publishes_one_signature_key() {
        let key = shared_key();
        let set = JwksPublisher::new(Arc::clone(&key)).publish();

        assert_eq!(set.keys.len(), 1);
        let jwk = &set.keys[0];
        assert_eq!(jwk.kid, key.kid());
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.usage.as_deref(), Some("sig"));
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        assert_eq!(jwk.e, "AQAB");
        assert!(!jwk.n.contains('='));
    }

    #[test]
    fn components_rebuild_the_public_key() {
        let key = shared_key();
        let jwk = JwksPublisher::new(Arc::clone(&key)).publish().keys.remove(0);

        let n = BigUint::from_bytes_be(&URL_SAFE_NO_PAD.decode(&jwk.n).unwrap());
        let e = BigUint::from_bytes_be(&URL_SAFE_NO_PAD.decode(&jwk.e).unwrap());
        assert_eq!(&RsaPublicKey::new(n, e).unwrap(), key.public_key());
        assert!(jwk.decoding_key().is_ok());
    }
}
