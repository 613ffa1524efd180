use axum::{response::IntoResponse, routing::get, Json, Router};
use http::{header, HeaderMap, HeaderValue};

use atlas_slo::{errors, Result};

use crate::AppState;

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/jwks.json", get(jwks))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses((status = 200, description = "Published verification keys"))
)]
pub async fn jwks(app: AppState) -> Result<impl IntoResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&format!(
            "public, max-age={}",
            app.config.jwks_max_age
        ))
        .map_err(errors::any)?,
    );
    Ok((headers, Json(app.publisher.publish())))
}
