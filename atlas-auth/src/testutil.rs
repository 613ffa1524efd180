use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::{pkcs1::EncodeRsaPrivateKey, traits::PublicKeyParts, RsaPrivateKey};

use crate::{Claims, Jwk};

pub(crate) struct TestKey {
    kid: String,
    encoding: EncodingKey,
    n: String,
    e: String,
}

impl TestKey {
    pub(crate) fn generate(kid: &str) -> Self {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let der = private.to_pkcs1_der().unwrap();
        Self {
            kid: kid.to_owned(),
            encoding: EncodingKey::from_rsa_der(der.as_bytes()),
            n: URL_SAFE_NO_PAD.encode(private.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private.e().to_bytes_be()),
        }
    }

    pub(crate) fn jwk(&self) -> Jwk {
        Jwk::rsa_signing(self.kid.clone(), self.n.clone(), self.e.clone())
    }

    pub(crate) fn sign(&self, claims: &Claims) -> String {
        self.sign_with_kid(claims, Some(&self.kid))
    }

    pub(crate) fn sign_with_kid(&self, claims: &Claims, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_owned);
        encode(&header, claims, &self.encoding).unwrap()
    }

    pub(crate) fn sign_with_alg(&self, claims: &Claims, alg: Algorithm) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding).unwrap()
    }
}

/// Claims issued now and valid for `ttl` seconds.
pub(crate) fn claims(iss: &str, aud: &str, ttl: i64) -> Claims {
    let now = jsonwebtoken::get_current_timestamp() as i64;
    Claims {
        iss: iss.to_owned(),
        aud: aud.to_owned(),
        sub: "alice".to_owned(),
        iat: now,
        nbf: now,
        exp: now + ttl,
        jti: "0123456789abcdef01234567".to_owned(),
        roles: Vec::new(),
    }
}
