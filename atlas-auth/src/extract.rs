use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use http::request::Parts;

use atlas_slo::errors::{self, WithBacktrace};

use crate::{Claims, RoleGate, TokenVerifier};

/// Claims of the caller's verified bearer token.
///
/// Verification happens once per request; a later extraction reuses the
/// claims stored in the request extensions.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WithBacktrace;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Self(claims.clone()));
        }
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(
                parts, state,
            )
            .await
            .map_err(|_| errors::unauthorized())?;

        let claims = Arc::<TokenVerifier>::from_ref(state)
            .verify(bearer.token())
            .await?;
        parts.extensions.insert(claims.clone());
        Ok(Self(claims))
    }
}

/// State for [`require_roles`]: the verifier and the roles one group of
/// routes requires.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    verifier: Arc<TokenVerifier>,
    gate: RoleGate,
}

impl RoleGuard {
    pub fn new(verifier: Arc<TokenVerifier>, gate: RoleGate) -> Self {
        Self { verifier, gate }
    }
}

impl FromRef<RoleGuard> for Arc<TokenVerifier> {
    fn from_ref(guard: &RoleGuard) -> Self {
        Arc::clone(&guard.verifier)
    }
}

/// Route middleware: 401 without a valid bearer token, 403 when the token
/// lacks every required role.
///
/// ```ignore
/// let guard = RoleGuard::new(verifier, RoleGate::any_of(["admin"]));
/// router.route_layer(axum::middleware::from_fn_with_state(guard, require_roles))
/// ```
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    Authenticated(claims): Authenticated,
    request: Request,
    next: Next,
) -> Result<Response, WithBacktrace> {
    guard.gate.check(&claims)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, middleware, routing::get, Router};
    use http::{header, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        source::MockKeySetSource,
        testutil::{claims, TestKey},
        JwkSet, JwksCache,
    };

    async fn whoami(Authenticated(claims): Authenticated) -> String {
        claims.sub
    }

    fn app(key: &TestKey) -> Router {
        let set = JwkSet {
            keys: vec![key.jwk()],
        };
        let mut source = MockKeySetSource::new();
        source.expect_fetch().returning(move || Ok(set.clone()));
        let verifier = Arc::new(TokenVerifier::new(
            Arc::new(JwksCache::new(Arc::new(source), Duration::from_secs(300))),
            "buildaxis-auth",
            "atlas-ai",
        ));
        let admin = RoleGuard::new(
            Arc::clone(&verifier),
            RoleGate::any_of(["admin"]),
        );
        Router::new()
            .route("/admin", get(whoami))
            .route_layer(middleware::from_fn_with_state(admin, require_roles))
            .route("/me", get(whoami))
            .with_state(verifier)
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder =
                builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let key = TestKey::generate("k1");
        let app = app(&key);

        for req in [
            get_with("/me", None),
            get_with("/me", Some("garbage")),
            get_with("/admin", None),
        ] {
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
        }
    }

    #[tokio::test]
    async fn role_gate_distinguishes_forbidden() {
        let key = TestKey::generate("k1");
        let app = app(&key);
        let mut c = claims("buildaxis-auth", "atlas-ai", 900);
        let viewer = key.sign(&c);
        c.roles = vec!["admin".to_owned()];
        let admin = key.sign(&c);

        let resp = app
            .clone()
            .oneshot(get_with("/me", Some(&viewer)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(get_with("/admin", Some(&viewer)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(get_with("/admin", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alice");
    }
}
