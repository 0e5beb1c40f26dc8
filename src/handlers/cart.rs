use crate::handlers::common::{
    map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    services::cart::{AddCartItemInput, LocalCartItem},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item_quantity))
        .route("/items/:item_id", delete(remove_item))
        .route("/merge", post(merge_cart))
        .route("/sync", put(sync_cart))
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .list(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<AddCartItemInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_item(user.id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

async fn update_item_quantity(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .update_quantity(user.id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .remove_item(user.id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .clear(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

#[derive(Debug, Deserialize)]
struct MergeCartRequest {
    items: Vec<LocalCartItem>,
}

/// Union the client-held cart into the server-side cart after login
async fn merge_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<MergeCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .merge(user.id, payload.items)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Replace the server-side cart with the client-held list
async fn sync_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<MergeCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .sync(user.id, payload.items)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}
