use crate::{Claims, VerifyError};

/// Any-of role check. An empty requirement admits every authenticated
/// caller.
pub fn authorize<S: AsRef<str>>(claims: &Claims, required: &[S]) -> bool {
    required.is_empty() || required.iter().any(|r| claims.has_role(r.as_ref()))
}

/// The roles an endpoint requires, fixed when the route is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGate {
    required: Vec<String>,
}

impl RoleGate {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn authorize(&self, claims: &Claims) -> bool {
        authorize(claims, self.required.as_slice())
    }

    pub fn check(&self, claims: &Claims) -> Result<(), VerifyError> {
        if self.authorize(claims) {
            Ok(())
        } else {
            Err(VerifyError::InsufficientRole)
        }
    }
}
