use thiserror::Error;

use atlas_slo::errors::{self, WithBacktrace};

/// Why a presented access token was not accepted.
///
/// Everything except [`VerifyError::InsufficientRole`] reaches the caller as
/// the same bare 401; the variant is only visible in logs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed token")]
    MalformedToken,
    #[error("unknown signing key")]
    UnknownSigningKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("issuer or audience mismatch")]
    IssuerOrAudienceMismatch,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("insufficient role")]
    InsufficientRole,
}

impl From<VerifyError> for WithBacktrace {
    fn from(err: VerifyError) -> Self {
        tracing::debug!(reason = %err, "bearer token rejected");
        match err {
            VerifyError::InsufficientRole => errors::forbidden("insufficient role"),
            _ => errors::unauthorized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[test]
    fn only_role_failures_are_forbidden() {
        for err in [
            VerifyError::MalformedToken,
            VerifyError::UnknownSigningKey,
            VerifyError::InvalidSignature,
            VerifyError::IssuerOrAudienceMismatch,
            VerifyError::Expired,
            VerifyError::NotYetValid,
        ] {
            let resp: WithBacktrace = err.into();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            // the reason never leaks into the message
            assert!(!resp.to_string().contains(&err.to_string()));
        }
        let resp: WithBacktrace = VerifyError::InsufficientRole.into();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
