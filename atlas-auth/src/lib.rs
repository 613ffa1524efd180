//! Verification side of Atlas access tokens.
//!
//! Every service that accepts Atlas bearer tokens builds one [`JwksCache`]
//! for the issuer's published key set, wraps it in a [`TokenVerifier`] and
//! gates handlers with a [`RoleGate`]. Nothing here talks to the issuer's
//! database; the only network traffic is the key set fetch.

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod jwk;
pub mod source;
pub mod verifier;

#[cfg(test)]
mod testutil;

pub use cache::JwksCache;
pub use claims::Claims;
pub use config::VerifierConfig;
pub use error::VerifyError;
pub use extract::{require_roles, Authenticated, RoleGuard};
pub use gate::{authorize, RoleGate};
pub use jwk::{Jwk, JwkSet};
pub use source::{HttpKeySetSource, KeySetSource};
pub use verifier::TokenVerifier;
