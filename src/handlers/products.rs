use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    PaginationParams,
};
use crate::{
    auth::AdminUser,
    errors::ApiError,
    services::audit::Actor,
    services::catalog::{
        CreateCategoryInput, CreateProductInput, ProductFilter, UpdateProductInput,
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Public storefront catalog routes
pub fn catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

pub fn category_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_categories))
}

/// Back-office catalog management routes
pub fn admin_catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(archive_product))
        .route("/categories", post(create_category))
}

/// List active products with filtering, sorting, and pagination
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "catalog",
    responses(
        (status = 200, description = "Paginated product listing"),
    )
)]
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let products = state
        .services
        .catalog
        .list_products(filter, page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(products))
}

/// Fetch a single product with its category
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "catalog",
    responses(
        (status = 200, description = "Product detail"),
        (status = 404, description = "Unknown product"),
    )
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let categories = state
        .services
        .catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(categories))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .create_product(payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .update_product(id, payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

async fn archive_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .catalog
        .archive_product(id, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let category = state
        .services
        .catalog
        .create_category(payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(created_response(category))
}
