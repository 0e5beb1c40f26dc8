use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginationParams,
};
use crate::{
    auth::{AdminUser, AuthenticatedUser},
    errors::ApiError,
    services::audit::Actor,
    services::users::{LoginRequest, RegisterRequest, UpdateRoleRequest},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

pub fn admin_user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id/role", put(update_role))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let user = state
        .services
        .users
        .register(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(user))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let response = state
        .services
        .users
        .login(payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}

async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .get(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let users = state
        .services
        .users
        .list_users(page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(users))
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let user = state
        .services
        .users
        .update_role(id, payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(user))
}
