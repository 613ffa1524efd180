use std::sync::Arc;

use axum::{
    extract::Path,
    middleware,
    routing::{get, post},
    Json, Router,
};

use atlas_auth::{require_roles, RoleGate, RoleGuard};
use atlas_slo::Result;

use crate::{services::user::ADMIN_ROLE, AppState};

use super::{UserChanged, UserView};

pub fn new_router(state: AppState) -> Router {
    let admin = RoleGuard::new(
        Arc::clone(&state.verifier),
        RoleGate::any_of([ADMIN_ROLE]),
    );
    Router::new()
        .route("/auth/users", get(list_users))
        .route("/auth/users/:username/roles/:role", post(grant_role))
        .route_layer(middleware::from_fn_with_state(admin, require_roles))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/auth/users",
    responses(
        (status = 200, body = [UserView]),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = []))
)]
pub async fn list_users(app: AppState) -> Result<Json<Vec<UserView>>> {
    let users = app.store.users.list().await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/auth/users/{username}/roles/{role}",
    params(
        ("username" = String, Path, description = "Account to change"),
        ("role" = String, Path, description = "Role to grant, created on first use"),
    ),
    responses(
        (status = 200, body = UserChanged),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "user not found"),
    ),
    security(("bearer" = []))
)]
pub async fn grant_role(
    app: AppState,
    Path((username, role)): Path<(String, String)>,
) -> Result<Json<UserChanged>> {
    let user = app.issuer.grant_role(&username, &role).await?;
    Ok(Json(user.into()))
}
