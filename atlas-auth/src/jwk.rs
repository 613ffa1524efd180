use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

use crate::VerifyError;

/// A published RSA verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default)]
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Modulus, big-endian, base64url without padding.
    #[serde(default)]
    pub n: String,
    /// Public exponent, big-endian, base64url without padding.
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    /// An RS256 signature key.
    pub fn rsa_signing(kid: impl Into<String>, n: String, e: String) -> Self {
        Self {
            kty: "RSA".to_owned(),
            usage: Some("sig".to_owned()),
            kid: kid.into(),
            alg: Some("RS256".to_owned()),
            n,
            e,
        }
    }

    /// The only algorithm tokens verified with this key may use.
    pub fn algorithm(&self) -> Result<Algorithm, VerifyError> {
        let alg = match &self.alg {
            None => Algorithm::RS256,
            Some(name) => Algorithm::from_str(name)
                .map_err(|_| VerifyError::UnknownSigningKey)?,
        };
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Ok(alg),
            _ => Err(VerifyError::UnknownSigningKey),
        }
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, VerifyError> {
        if self.kty != "RSA" || self.usage.as_deref().is_some_and(|u| u != "sig")
        {
            return Err(VerifyError::UnknownSigningKey);
        }
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|_| VerifyError::UnknownSigningKey)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}
