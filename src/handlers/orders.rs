use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginationParams,
};
use crate::{
    auth::{AdminUser, AuthenticatedUser},
    errors::{ApiError, ServiceError},
    services::audit::Actor,
    services::orders::{CheckoutRequest, OrderListFilter, UpdateOrderStatusRequest},
    services::payments::{ProofUpload, VerifyPaymentRequest},
    AppState,
};
use axum::{
    extract::{Json, Multipart, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Customer-facing order routes
pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(checkout))
        .route("/", get(my_orders))
        .route("/:id", get(get_order))
        .route("/:id/payment-proof", post(upload_payment_proof))
}

/// Back-office order management routes
pub fn admin_order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(admin_get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/payment/verify", post(verify_payment))
}

/// Create an order (and its payment record) from selected cart items
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "orders",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created awaiting payment"),
        (status = 400, description = "No usable cart items selected"),
    )
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .orders
        .checkout(user.id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

async fn my_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let orders = state
        .services
        .orders
        .list_orders_for_user(user.id, page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// Fetch one of the caller's orders, including items and payment
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    responses(
        (status = 200, description = "Order detail with items and payment"),
        (status = 404, description = "Unknown order or not the caller's"),
    )
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let detail = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    // Non-admins only ever see their own orders; report foreign orders as
    // missing rather than confirming they exist.
    if !user.is_admin() && detail.order.user_id != Some(user.id) {
        return Err(ApiError::ServiceError(ServiceError::NotFound(format!(
            "Order {} not found",
            id
        ))));
    }

    Ok(success_response(detail))
}

/// Upload a proof-of-payment image for an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-proof",
    tag = "payments",
    responses(
        (status = 200, description = "Proof stored, order moved to review queue"),
        (status = 400, description = "Missing or empty file field"),
        (status = 502, description = "Object store unavailable"),
    )
)]
pub async fn upload_payment_proof(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let mut upload: Option<ProofUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {}", e)))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed reading upload: {}", e)))?;
            upload = Some(ProofUpload {
                bytes,
                content_type,
            });
        }
    }

    let upload = upload.ok_or_else(|| {
        ApiError::ValidationError("multipart field 'file' is required".to_string())
    })?;

    let response = state
        .services
        .payments
        .upload_proof(id, user.id, upload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<OrderListFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let orders = state
        .services
        .orders
        .list_orders(filter, page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

async fn admin_get_order(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let detail = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(detail))
}

/// Update an order's status under optimistic locking
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    tag = "orders",
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status written, version bumped", body = crate::services::orders::StatusUpdateResponse),
        (status = 404, description = "Unknown order"),
        (status = 409, description = "Stale expected version"),
    )
)]
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let response = state
        .services
        .orders
        .update_order_status(id, payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}

/// Record a payment verify/reject decision
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/payment/verify",
    tag = "payments",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Decision recorded, order status coupled", body = crate::services::payments::PaymentDecisionResponse),
        (status = 404, description = "Unknown order or payment"),
        (status = 409, description = "Payment already verified"),
    )
)]
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let response = state
        .services
        .payments
        .verify_payment(id, payload, &Actor::from(&admin))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(response))
}
