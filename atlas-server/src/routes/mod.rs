use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderValue, Uri,
};
use prometheus::{Encoder, TextEncoder};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders},
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use atlas_slo::errors;

use crate::{
    controllers::{self, auth, jwks, users},
    services::token::TokenPair,
    var::{HTTP_REQUESTS_DURATION_SECONDS, HTTP_REQUESTS_TOTAL},
    AppState,
};

const TRACE_ID: &str = "x-trace-id";

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_form,
        auth::login_json,
        auth::refresh,
        auth::logout,
        auth::me,
        auth::register,
        users::list_users,
        users::grant_role,
        jwks::jwks,
    ),
    components(schemas(
        TokenPair,
        auth::Credentials,
        auth::RefreshRequest,
        auth::Registration,
        auth::Detail,
        controllers::UserView,
        controllers::UserChanged,
    )),
    modifiers(&BearerAuth),
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Debug)]
pub struct AppRouter;

impl AppRouter {
    pub fn build(state: AppState) -> Result<Router> {
        let cors = if state.config.allow_origins.is_empty() {
            None
        } else {
            let origins = state
                .config
                .allow_origins
                .iter()
                .map(|origin| origin.trim().parse::<HeaderValue>())
                .collect::<Result<Vec<_>, _>>()?;
            Some(Self::cors(origins))
        };

        let mut router = Router::new()
            .merge(
                SwaggerUi::new("/swagger-ui")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
            .merge(jwks::new_router(state.clone()))
            .merge(auth::new_router(state.clone()))
            .merge(users::new_router(state))
            .fallback(Self::not_found)
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request| {
                            let trace_id = request
                                .headers()
                                .get(TRACE_ID)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "request",
                                trace_id = %trace_id,
                                method = %request.method(),
                                uri = %request.uri(),
                            )
                        })
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                ),
            )
            .layer(middleware::from_fn(Self::trace));
        if let Some(cors) = cors {
            router = router.layer(cors);
        }

        Ok(router
            .route_layer(middleware::from_fn(Self::track_metrics))
            .route("/metrics", get(Self::metrics)))
    }

    fn cors(origins: Vec<HeaderValue>) -> CorsLayer {
        CorsLayer::new()
            .expose_headers(ExposeHeaders::list(vec![
                HeaderName::from_static(TRACE_ID),
            ]))
            .allow_headers(AllowHeaders::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .max_age(Duration::from_secs(60) * 60 * 12)
    }

    /// Propagates the caller's trace id, or assigns one, on both the
    /// request and the response.
    async fn trace(mut request: Request, next: Next) -> Response {
        let trace_id = match request.headers().get(TRACE_ID) {
            Some(v) => Some(v.clone()),
            None => {
                let generated = HeaderValue::from_str(
                    &uuid::Uuid::new_v4().hyphenated().to_string(),
                )
                .ok();
                if let Some(v) = &generated {
                    request.headers_mut().insert(TRACE_ID, v.clone());
                }
                generated
            }
        };
        let mut response = next.run(request).await;
        if let Some(v) = trace_id {
            response.headers_mut().insert(TRACE_ID, v);
        }
        response
    }

    async fn track_metrics(request: Request, next: Next) -> impl IntoResponse {
        let path = if let Some(matched_path) =
            request.extensions().get::<MatchedPath>()
        {
            matched_path.as_str().to_owned()
        } else {
            request.uri().path().to_owned()
        };
        let start = Instant::now();
        let method = request.method().to_string();
        let response = next.run(request).await;
        let latency = start.elapsed();

        let status = response.status().as_u16().to_string();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[&method, &path, &status])
            .inc();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&[&method, &path])
            .observe(latency.as_secs_f64());

        response
    }

    async fn metrics() -> atlas_slo::Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(errors::any)?;

        Response::builder()
            .status(200)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Body::from(buffer))
            .map_err(errors::any)
    }

    async fn not_found(uri: Uri) -> impl IntoResponse {
        errors::not_found(&format!("no route for {}", uri))
    }
}
