use axum::{routing::{get, post}, Form, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use atlas_auth::Authenticated;
use atlas_slo::{errors, Result};
use atlas_storage::User;

use crate::{
    services::token::TokenPair, valid::Valid, var::TOKENS_ISSUED_TOTAL,
    AppState,
};

use super::{UserChanged, UserView};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/token", post(login_form))
        .route("/token_json", post(login_json))
        .route("/token/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/register", post(register))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct Registration {
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Detail {
    pub detail: String,
}

async fn login(app: &AppState, input: &Credentials) -> Result<Json<TokenPair>> {
    let user = app
        .issuer
        .authenticate(&input.username, &input.password)
        .await?;
    let pair = app.issuer.issue_pair(&user).await?;
    TOKENS_ISSUED_TOTAL.with_label_values(&["login"]).inc();
    info!(username = %user.username, "login");
    Ok(Json(pair))
}

/// Resolves the caller's account; a token for a deleted user is refused.
async fn caller(app: &AppState, claims: &atlas_auth::Claims) -> Result<User> {
    app.store
        .users
        .find_by_username(&claims.sub)
        .await?
        .ok_or_else(errors::unauthorized)
}

#[utoipa::path(
    post,
    path = "/token",
    request_body(content = Credentials, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, body = TokenPair),
        (status = 401, description = "Incorrect username or password"),
    )
)]
pub async fn login_form(
    app: AppState,
    Valid(Form(input)): Valid<Form<Credentials>>,
) -> Result<Json<TokenPair>> {
    login(&app, &input).await
}

#[utoipa::path(
    post,
    path = "/token_json",
    request_body = Credentials,
    responses(
        (status = 200, body = TokenPair),
        (status = 401, description = "Incorrect username or password"),
    )
)]
pub async fn login_json(
    app: AppState,
    Valid(Json(input)): Valid<Json<Credentials>>,
) -> Result<Json<TokenPair>> {
    login(&app, &input).await
}

#[utoipa::path(
    post,
    path = "/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, body = TokenPair),
        (status = 400, description = "Invalid refresh token"),
    )
)]
pub async fn refresh(
    app: AppState,
    Valid(Json(input)): Valid<Json<RefreshRequest>>,
) -> Result<Json<TokenPair>> {
    let pair = app.issuer.refresh(&input.refresh_token).await?;
    TOKENS_ISSUED_TOTAL.with_label_values(&["refresh"]).inc();
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, body = Detail), (status = 401, description = "Missing or invalid bearer token")),
    security(("bearer" = []))
)]
pub async fn logout(
    app: AppState,
    Authenticated(claims): Authenticated,
) -> Result<Json<Detail>> {
    let user = caller(&app, &claims).await?;
    app.issuer.logout(&user).await?;
    Ok(Json(Detail {
        detail: "ok".to_owned(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, body = UserView), (status = 401, description = "Missing or invalid bearer token")),
    security(("bearer" = []))
)]
pub async fn me(
    app: AppState,
    Authenticated(claims): Authenticated,
) -> Result<Json<UserView>> {
    Ok(Json(caller(&app, &claims).await?.into()))
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = Registration,
    responses(
        (status = 200, body = UserChanged),
        (status = 400, description = "Username already exists"),
    )
)]
pub async fn register(
    app: AppState,
    Valid(Json(input)): Valid<Json<Registration>>,
) -> Result<Json<UserChanged>> {
    let user = app.issuer.register(&input.username, &input.password).await?;
    Ok(Json(user.into()))
}
