use crate::handlers::common::{map_service_error, success_response};
use crate::{auth::AuthenticatedUser, errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn wishlist_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_wishlist))
        .route("/items", post(add_item))
        .route("/items/:product_id", delete(remove_item))
        .route("/merge", post(merge_wishlist))
}

async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let wishlist = state
        .services
        .wishlist
        .list(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(wishlist))
}

#[derive(Debug, Deserialize)]
struct AddWishlistItemRequest {
    product_id: Uuid,
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<AddWishlistItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let wishlist = state
        .services
        .wishlist
        .add(user.id, payload.product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(wishlist))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let wishlist = state
        .services
        .wishlist
        .remove(user.id, product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(wishlist))
}

#[derive(Debug, Deserialize)]
struct MergeWishlistRequest {
    product_ids: Vec<Uuid>,
}

/// Union the client-held wishlist into the server-side one after login
async fn merge_wishlist(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<MergeWishlistRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let wishlist = state
        .services
        .wishlist
        .merge(user.id, payload.product_ids)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(wishlist))
}
